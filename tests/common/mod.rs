#![allow(dead_code)]

use std::net::UdpSocket;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use dnswalk::dns::{DnsHeader, DnsName, DnsPacket, DnsRecord, Reader, FLAG_RESPONSE};

pub type ResponseFn = Box<dyn Fn(&DnsPacket) -> Vec<u8> + Send>;

// A scripted nameserver on a loopback address. Each incoming query consumes
// the next response builder; the thread exits once the script is spent or
// no query arrives within the idle timeout.
pub struct FakeServer {
    pub ip: String,
    pub port: u16,
    handle: JoinHandle<()>,
}

impl FakeServer {
    pub fn spawn(ip: &str, port: u16, responses: Vec<ResponseFn>) -> FakeServer {
        let socket = UdpSocket::bind((ip, port)).unwrap();
        let port = socket.local_addr().unwrap().port();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        let handle = thread::spawn(move || {
            let mut buf = [0u8; 4096];
            for respond in responses {
                let Ok((len, peer)) = socket.recv_from(&mut buf) else {
                    return;
                };
                let query = DnsPacket::decode(&mut Reader::new(&buf, len)).unwrap();
                socket.send_to(&respond(&query), peer).unwrap();
            }
        });

        FakeServer {
            ip: ip.to_string(),
            port,
            handle,
        }
    }

    // Propagates any assertion failure from inside a response closure.
    pub fn join(self) {
        self.handle.join().unwrap();
    }
}

pub fn name(s: &str) -> DnsName {
    DnsName::new(s).unwrap()
}

fn response_for(query: &DnsPacket) -> DnsPacket {
    DnsPacket::new(DnsHeader::new(query.header.id, FLAG_RESPONSE))
}

pub fn referral_response(
    query: &DnsPacket,
    zone: &str,
    ns_hosts: &[&str],
    glue: &[(&str, &str)],
) -> Vec<u8> {
    let mut packet = response_for(query);
    for host in ns_hosts {
        packet
            .authorities
            .push(DnsRecord::ns(name(zone), name(host), 300));
    }
    for (host, ip) in glue {
        packet
            .additionals
            .push(DnsRecord::a(name(host), ip.parse().unwrap(), 300));
    }
    packet.encode().unwrap()
}

pub fn a_response(query: &DnsPacket, domain: &str, addr: &str) -> Vec<u8> {
    let mut packet = response_for(query);
    packet
        .answers
        .push(DnsRecord::a(name(domain), addr.parse().unwrap(), 60));
    packet.encode().unwrap()
}

pub fn ns_response(query: &DnsPacket, domain: &str, hosts: &[&str]) -> Vec<u8> {
    let mut packet = response_for(query);
    for host in hosts {
        packet
            .answers
            .push(DnsRecord::ns(name(domain), name(host), 60));
    }
    packet.encode().unwrap()
}

pub fn empty_response(query: &DnsPacket, rcode: u8) -> Vec<u8> {
    let mut packet = response_for(query);
    packet.header.flags |= rcode as u16;
    packet.encode().unwrap()
}
