use std::collections::VecDeque;
use std::fmt;
use std::io::Write;
use std::net::UdpSocket;
use std::time::Duration;

use log::{debug, trace};

use crate::dns::{
    encode_opt, DnsHeader, DnsName, DnsPacket, DnsQuestion, Reader, RecordData, ResponseCode,
    EDNS_UDP_PAYLOAD, FLAG_RECURSION_DESIRED, TYPE_A, TYPE_NS,
};
use crate::Result;

pub const DNS_PORT: u16 = 53;
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(3);

// Queue replacements allowed before a delegation chain is treated as cyclic.
// Real chains follow two referrals (root to TLD, TLD to authoritative).
pub const MAX_REFERRALS: usize = 8;

const ROOT_SERVERS: &[(&str, &str)] = &[
    ("198.41.0.4", "a.root-servers.net"),
    ("199.9.14.201", "b.root-servers.net"),
    ("192.33.4.12", "c.root-servers.net"),
    ("199.7.91.13", "d.root-servers.net"),
    ("192.203.230.10", "e.root-servers.net"),
];

const RECURSIVE_UPSTREAM: &str = "8.8.8.8";

#[derive(Clone, Debug)]
pub struct RootServer {
    pub ip: String,
    pub label: String,
}

#[derive(Clone, Debug)]
pub struct ResolverConfig {
    pub roots: Vec<RootServer>,
    pub port: u16,
    pub timeout: Duration,
    pub max_referrals: usize,
    pub recursive_upstream: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            roots: ROOT_SERVERS
                .iter()
                .map(|&(ip, label)| RootServer {
                    ip: ip.to_string(),
                    label: label.to_string(),
                })
                .collect(),
            port: DNS_PORT,
            timeout: QUERY_TIMEOUT,
            max_referrals: MAX_REFERRALS,
            recursive_upstream: RECURSIVE_UPSTREAM.to_string(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    Root,
    Tld,
    Auth,
}

impl Stage {
    pub fn advance(self) -> Self {
        match self {
            Stage::Root => Stage::Tld,
            Stage::Tld => Stage::Auth,
            Stage::Auth => Stage::Auth,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Root => f.write_str("ROOT"),
            Stage::Tld => f.write_str("TLD"),
            Stage::Auth => f.write_str("AUTH"),
        }
    }
}

#[derive(Debug)]
pub enum QueryOutcome {
    Answer(String),
    Referral(DnsPacket),
    Failure,
}

fn build_query(domain: &str, record_type: u16, flags: u16) -> Result<Vec<u8>> {
    let mut header = DnsHeader::new_with_rand_id(flags);
    header.num_additionals = 1;
    let question = DnsQuestion::new(DnsName::new(domain)?, record_type);

    let mut buffer = header.encode();
    buffer.extend(question.encode()?);
    buffer.extend(encode_opt(EDNS_UDP_PAYLOAD));

    Ok(buffer)
}

pub fn extract_next_nameservers<W: Write>(
    packet: &DnsPacket,
    out: &mut W,
) -> Result<Vec<String>> {
    let mut ns_names: Vec<&DnsName> = vec![];
    for record in &packet.authorities {
        if let RecordData::Ns(host) = &record.data {
            writeln!(out, "Extracted NS hostname: {host}")?;
            ns_names.push(host);
        }
    }

    // Glue only: an additional-section address is used when its owner name is
    // one of the NS hosts above. NS hosts without glue are not chased.
    let mut ns_ips = vec![];
    for record in &packet.additionals {
        if let RecordData::A(addr) = &record.data {
            if ns_names.iter().any(|n| n.eq_ignore_case(&record.name)) {
                writeln!(out, "Resolved {} to {addr}", record.name)?;
                ns_ips.push(addr.to_string());
            }
        }
    }

    Ok(ns_ips)
}

pub struct Resolver {
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn send_query(&self, server_ip: &str, domain: &str) -> QueryOutcome {
        match self.try_query(server_ip, domain) {
            Ok(outcome) => outcome,
            Err(err) => {
                debug!("query to {server_ip} failed: {err}");
                QueryOutcome::Failure
            }
        }
    }

    fn try_query(&self, server_ip: &str, domain: &str) -> Result<QueryOutcome> {
        let query = build_query(domain, TYPE_A, 0)?;

        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_read_timeout(Some(self.config.timeout))?;
        socket.connect(format!("{}:{}", server_ip, self.config.port))?;
        socket.send(&query)?;

        let mut recv_buffer = [0u8; EDNS_UDP_PAYLOAD as usize];
        let recv_size = socket.recv(&mut recv_buffer)?;
        trace!("{server_ip} answered with {recv_size} bytes");

        let packet = DnsPacket::decode(&mut Reader::new(&recv_buffer, recv_size))?;
        if packet.header.rcode() != ResponseCode::NoError {
            debug!("{server_ip} answered with {}", packet.header.rcode());
        }

        match packet.first_answer() {
            Some(value) => Ok(QueryOutcome::Answer(value)),
            None => Ok(QueryOutcome::Referral(packet)),
        }
    }

    pub fn iterative_lookup<W: Write>(&self, domain: &str, out: &mut W) -> Result<()> {
        writeln!(out, "[Iterative DNS Lookup] Resolving {domain}")?;
        debug!(
            "seeding candidate queue with {} root servers",
            self.config.roots.len()
        );

        let mut queue: VecDeque<String> =
            self.config.roots.iter().map(|r| r.ip.clone()).collect();
        let mut stage = Stage::Root;
        let mut referrals = 0;

        while let Some(server_ip) = queue.pop_front() {
            match self.send_query(&server_ip, domain) {
                QueryOutcome::Failure => {
                    writeln!(out, "[ERROR] Query failed for {stage} {server_ip}")?;
                }
                QueryOutcome::Answer(value) => {
                    writeln!(out, "[DEBUG] Querying {stage} server ({server_ip}) - SUCCESS")?;
                    writeln!(out, "[SUCCESS] {domain} -> {value}")?;
                    return Ok(());
                }
                QueryOutcome::Referral(packet) => {
                    writeln!(out, "[DEBUG] Querying {stage} server ({server_ip}) - SUCCESS")?;
                    referrals += 1;
                    if referrals > self.config.max_referrals {
                        debug!("referral limit of {} reached", self.config.max_referrals);
                        break;
                    }
                    // The queue is replaced wholesale; earlier candidates are
                    // gone once a referral is followed.
                    queue = extract_next_nameservers(&packet, out)?.into();
                    stage = stage.advance();
                }
            }
        }

        writeln!(out, "[ERROR] Resolution failed.")?;

        Ok(())
    }

    pub fn recursive_lookup<W: Write>(&self, domain: &str, out: &mut W) -> Result<()> {
        writeln!(out, "[Recursive DNS Lookup] Resolving {domain}")?;

        if let Err(err) = self.try_recursive(domain, out) {
            writeln!(out, "[ERROR] Recursive lookup failed: {err}")?;
        }

        Ok(())
    }

    fn try_recursive<W: Write>(&self, domain: &str, out: &mut W) -> Result<()> {
        for record_type in [TYPE_NS, TYPE_A] {
            for value in self.query_upstream(domain, record_type)? {
                writeln!(out, "[SUCCESS] {domain} -> {value}")?;
            }
        }

        Ok(())
    }

    fn query_upstream(&self, domain: &str, record_type: u16) -> Result<Vec<String>> {
        let query = build_query(domain, record_type, FLAG_RECURSION_DESIRED)?;

        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_read_timeout(Some(self.config.timeout))?;
        socket.connect(format!(
            "{}:{}",
            self.config.recursive_upstream, self.config.port
        ))?;
        socket.send(&query)?;

        let mut recv_buffer = [0u8; EDNS_UDP_PAYLOAD as usize];
        let recv_size = socket.recv(&mut recv_buffer)?;

        let packet = DnsPacket::decode(&mut Reader::new(&recv_buffer, recv_size))?;
        let rcode = packet.header.rcode();
        if rcode != ResponseCode::NoError {
            return Err(crate::Error::custom(format!("server returned {rcode}")));
        }
        if packet.answers.is_empty() {
            return Err("no answer records returned".into());
        }

        Ok(packet.answers.iter().map(|r| r.presentable()).collect())
    }
}
