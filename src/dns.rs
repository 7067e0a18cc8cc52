use std::fmt;
use std::net::Ipv4Addr;

use rand::Rng;

use crate::{Error, Result};

pub const TYPE_A: u16 = 1;
pub const TYPE_NS: u16 = 2;
pub const TYPE_OPT: u16 = 41;

pub const CLASS_IN: u16 = 1;

pub const FLAG_RESPONSE: u16 = 0x8000;
pub const FLAG_RECURSION_DESIRED: u16 = 0x0100;

// Default 512-byte UDP responses drop glue records for zones with many
// nameservers, so every query advertises a larger receive buffer via EDNS.
pub const EDNS_UDP_PAYLOAD: u16 = 4096;

// Bound on compression-pointer jumps per name; real packets use one or two.
const MAX_JUMPS: usize = 5;

pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    len: usize,
}

impl Reader<'_> {
    pub fn new(buf: &[u8], len: usize) -> Reader<'_> {
        Reader { buf, pos: 0, len }
    }

    fn read(&mut self, len: usize) -> Result<&[u8]> {
        if self.pos + len > self.len {
            return Err(Error::EndOfPacket {
                pos: self.pos,
                wanted: len,
            });
        }
        let r = &self.buf[self.pos..self.pos + len];
        self.pos += len;

        Ok(r)
    }

    fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.len {
            return Err(Error::EndOfPacket { pos, wanted: 0 });
        }
        self.pos = pos;

        Ok(())
    }

    fn tell(&self) -> usize {
        self.pos
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DnsName(String);

impl DnsName {
    pub fn new(s: &str) -> Result<Self> {
        if !s.is_ascii() {
            return Err(Error::NotAscii);
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // DNS names compare case-insensitively.
    pub fn eq_ignore_case(&self, other: &DnsName) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }

    fn decode(r: &mut Reader) -> Result<Self> {
        let mut parts: Vec<String> = vec![];
        let mut jumps = 0;
        let mut return_pos = None;

        loop {
            let len = r.read(1)?[0];
            if len == 0 {
                break;
            }
            match len & 0b1100_0000 {
                0b1100_0000 => {
                    if jumps >= MAX_JUMPS {
                        return Err(Error::PointerLoop { jumps });
                    }
                    jumps += 1;
                    let pointer = u16::from_be_bytes([len & 0b0011_1111, r.read(1)?[0]]);
                    if return_pos.is_none() {
                        return_pos = Some(r.tell());
                    }
                    r.seek(pointer as usize)?;
                }
                0b0000_0000 => {
                    let part = r.read(len as usize)?;
                    parts.push(String::from_utf8_lossy(part).into_owned());
                }
                _ => return Err(Error::BadLabel { len }),
            }
        }

        if let Some(pos) = return_pos {
            r.seek(pos)?;
        }

        Ok(Self(parts.join(".")))
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut encoded = vec![];
        for label in self.0.split('.') {
            if label.is_empty() {
                return Err(Error::EmptyLabel);
            }
            if label.len() > 63 {
                return Err(Error::LabelTooLong { len: label.len() });
            }
            encoded.push(label.len() as u8);
            encoded.extend_from_slice(label.as_bytes());
        }
        encoded.push(0);

        Ok(encoded)
    }
}

impl fmt::Display for DnsName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResponseCode {
    NoError,
    FormErr,
    ServFail,
    NxDomain,
    NotImp,
    Refused,
    Other(u8),
}

impl ResponseCode {
    pub fn from_u8(num: u8) -> ResponseCode {
        match num {
            0 => ResponseCode::NoError,
            1 => ResponseCode::FormErr,
            2 => ResponseCode::ServFail,
            3 => ResponseCode::NxDomain,
            4 => ResponseCode::NotImp,
            5 => ResponseCode::Refused,
            n => ResponseCode::Other(n),
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseCode::NoError => f.write_str("NOERROR"),
            ResponseCode::FormErr => f.write_str("FORMERR"),
            ResponseCode::ServFail => f.write_str("SERVFAIL"),
            ResponseCode::NxDomain => f.write_str("NXDOMAIN"),
            ResponseCode::NotImp => f.write_str("NOTIMP"),
            ResponseCode::Refused => f.write_str("REFUSED"),
            ResponseCode::Other(n) => write!(f, "RCODE{n}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DnsHeader {
    pub id: u16,
    pub flags: u16,
    pub num_questions: u16,
    pub num_answers: u16,
    pub num_authorities: u16,
    pub num_additionals: u16,
}

impl DnsHeader {
    pub fn new(id: u16, flags: u16) -> Self {
        Self {
            id,
            flags,
            num_questions: 0,
            num_answers: 0,
            num_authorities: 0,
            num_additionals: 0,
        }
    }

    pub fn new_with_rand_id(flags: u16) -> Self {
        let mut rng = rand::thread_rng();

        let mut header = Self::new(rng.gen(), flags);
        header.num_questions = 1;

        header
    }

    pub fn rcode(&self) -> ResponseCode {
        ResponseCode::from_u8((self.flags & 0x000F) as u8)
    }

    pub fn decode(r: &mut Reader) -> Result<Self> {
        let b = r.read(12)?;
        Ok(Self {
            id: u16::from_be_bytes(b[0..2].try_into().unwrap()),
            flags: u16::from_be_bytes(b[2..4].try_into().unwrap()),
            num_questions: u16::from_be_bytes(b[4..6].try_into().unwrap()),
            num_answers: u16::from_be_bytes(b[6..8].try_into().unwrap()),
            num_authorities: u16::from_be_bytes(b[8..10].try_into().unwrap()),
            num_additionals: u16::from_be_bytes(b[10..12].try_into().unwrap()),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = vec![];

        buffer.extend(self.id.to_be_bytes());
        buffer.extend(self.flags.to_be_bytes());
        buffer.extend(self.num_questions.to_be_bytes());
        buffer.extend(self.num_answers.to_be_bytes());
        buffer.extend(self.num_authorities.to_be_bytes());
        buffer.extend(self.num_additionals.to_be_bytes());

        buffer
    }
}

#[derive(Clone, Debug)]
pub struct DnsQuestion {
    pub name: DnsName,
    pub qtype: u16,
    pub qclass: u16,
}

impl DnsQuestion {
    pub fn new(name: DnsName, qtype: u16) -> Self {
        Self {
            name,
            qtype,
            qclass: CLASS_IN,
        }
    }

    pub fn decode(r: &mut Reader) -> Result<Self> {
        let name = DnsName::decode(r)?;
        let b = r.read(4)?;

        Ok(Self {
            name,
            qtype: u16::from_be_bytes(b[0..2].try_into().unwrap()),
            qclass: u16::from_be_bytes(b[2..4].try_into().unwrap()),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buffer = self.name.encode()?;

        buffer.extend(self.qtype.to_be_bytes());
        buffer.extend(self.qclass.to_be_bytes());

        Ok(buffer)
    }
}

#[derive(Clone, Debug)]
pub enum RecordData {
    A(Ipv4Addr),
    Ns(DnsName),
    Other,
}

#[derive(Clone, Debug)]
pub struct DnsRecord {
    pub name: DnsName,
    pub rtype: u16,
    pub rclass: u16,
    pub ttl: u32,
    pub data: RecordData,
}

impl DnsRecord {
    pub fn a(name: DnsName, addr: Ipv4Addr, ttl: u32) -> Self {
        Self {
            name,
            rtype: TYPE_A,
            rclass: CLASS_IN,
            ttl,
            data: RecordData::A(addr),
        }
    }

    pub fn ns(name: DnsName, host: DnsName, ttl: u32) -> Self {
        Self {
            name,
            rtype: TYPE_NS,
            rclass: CLASS_IN,
            ttl,
            data: RecordData::Ns(host),
        }
    }

    pub fn decode(r: &mut Reader) -> Result<Self> {
        let name = DnsName::decode(r)?;
        let b = r.read(10)?;

        let rtype = u16::from_be_bytes(b[0..2].try_into().unwrap());
        let rclass = u16::from_be_bytes(b[2..4].try_into().unwrap());
        let ttl = u32::from_be_bytes(b[4..8].try_into().unwrap());
        let data_len = u16::from_be_bytes(b[8..10].try_into().unwrap()) as usize;
        let data_start = r.tell();

        let data = match rtype {
            TYPE_A if data_len == 4 => {
                let octets: [u8; 4] = r.read(4)?.try_into().unwrap();
                RecordData::A(Ipv4Addr::from(octets))
            }
            TYPE_NS => RecordData::Ns(DnsName::decode(r)?),
            _ => {
                r.read(data_len)?;
                RecordData::Other
            }
        };

        // RDATA of a compressed NS name can end short of the declared length.
        r.seek(data_start + data_len)?;

        Ok(Self {
            name,
            rtype,
            rclass,
            ttl,
            data,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buffer = self.name.encode()?;

        buffer.extend(self.rtype.to_be_bytes());
        buffer.extend(self.rclass.to_be_bytes());
        buffer.extend(self.ttl.to_be_bytes());

        match &self.data {
            RecordData::A(addr) => {
                buffer.extend(4u16.to_be_bytes());
                buffer.extend(addr.octets());
            }
            RecordData::Ns(host) => {
                let encoded = host.encode()?;
                buffer.extend((encoded.len() as u16).to_be_bytes());
                buffer.extend(encoded);
            }
            RecordData::Other => {
                buffer.extend(0u16.to_be_bytes());
            }
        }

        Ok(buffer)
    }

    pub fn presentable(&self) -> String {
        match &self.data {
            RecordData::A(addr) => addr.to_string(),
            RecordData::Ns(host) => host.to_string(),
            RecordData::Other => format!("<type {} record>", self.rtype),
        }
    }
}

// OPT pseudo-record (RFC 6891): root owner name, the CLASS field carries the
// advertised UDP payload size, no options in RDATA.
pub fn encode_opt(udp_payload: u16) -> Vec<u8> {
    let mut buffer = vec![0];

    buffer.extend(TYPE_OPT.to_be_bytes());
    buffer.extend(udp_payload.to_be_bytes());
    buffer.extend(0u32.to_be_bytes());
    buffer.extend(0u16.to_be_bytes());

    buffer
}

#[derive(Clone, Debug)]
pub struct DnsPacket {
    pub header: DnsHeader,
    pub questions: Vec<DnsQuestion>,
    pub answers: Vec<DnsRecord>,
    pub authorities: Vec<DnsRecord>,
    pub additionals: Vec<DnsRecord>,
}

impl DnsPacket {
    pub fn new(header: DnsHeader) -> Self {
        Self {
            header,
            questions: vec![],
            answers: vec![],
            authorities: vec![],
            additionals: vec![],
        }
    }

    pub fn decode(r: &mut Reader) -> Result<Self> {
        let header = DnsHeader::decode(r)?;

        let mut questions = vec![];
        for _ in 0..header.num_questions {
            questions.push(DnsQuestion::decode(r)?);
        }
        let mut answers = vec![];
        for _ in 0..header.num_answers {
            answers.push(DnsRecord::decode(r)?);
        }
        let mut authorities = vec![];
        for _ in 0..header.num_authorities {
            authorities.push(DnsRecord::decode(r)?);
        }
        let mut additionals = vec![];
        for _ in 0..header.num_additionals {
            additionals.push(DnsRecord::decode(r)?);
        }

        Ok(Self {
            header,
            questions,
            answers,
            authorities,
            additionals,
        })
    }

    pub fn encode(&mut self) -> Result<Vec<u8>> {
        self.header.num_questions = self.questions.len() as u16;
        self.header.num_answers = self.answers.len() as u16;
        self.header.num_authorities = self.authorities.len() as u16;
        self.header.num_additionals = self.additionals.len() as u16;

        let mut buffer = self.header.encode();
        for question in &self.questions {
            buffer.extend(question.encode()?);
        }
        for record in self
            .answers
            .iter()
            .chain(&self.authorities)
            .chain(&self.additionals)
        {
            buffer.extend(record.encode()?);
        }

        Ok(buffer)
    }

    pub fn first_answer(&self) -> Option<String> {
        self.answers.first().map(DnsRecord::presentable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> DnsName {
        DnsName::new(s).unwrap()
    }

    #[test]
    fn encodes_name_as_labels() {
        let encoded = name("example.com").encode().unwrap();

        let mut want = vec![7u8];
        want.extend(b"example");
        want.push(3);
        want.extend(b"com");
        want.push(0);
        assert_eq!(encoded, want);
    }

    #[test]
    fn rejects_oversized_label() {
        let long = "a".repeat(64);
        assert!(matches!(
            name(&long).encode(),
            Err(Error::LabelTooLong { len: 64 })
        ));
    }

    #[test]
    fn decodes_name_with_compression_pointer() {
        // "ns1.example.com" at offset 0, then a second name "www" + pointer
        // back to "example.com" at offset 4.
        let mut buf = vec![];
        buf.extend(name("ns1.example.com").encode().unwrap());
        let second_start = buf.len();
        buf.push(3);
        buf.extend(b"www");
        buf.extend([0xC0, 4]);

        let mut r = Reader::new(&buf, buf.len());
        r.seek(second_start).unwrap();
        let decoded = DnsName::decode(&mut r).unwrap();

        assert_eq!(decoded.as_str(), "www.example.com");
        assert_eq!(r.tell(), buf.len());
    }

    #[test]
    fn rejects_pointer_loop() {
        // A pointer that points at itself.
        let buf = [0xC0u8, 0];
        let mut r = Reader::new(&buf, buf.len());

        assert!(matches!(
            DnsName::decode(&mut r),
            Err(Error::PointerLoop { .. })
        ));
    }

    #[test]
    fn header_roundtrips() {
        let mut header = DnsHeader::new(0x1234, FLAG_RESPONSE | 3);
        header.num_answers = 2;
        header.num_additionals = 1;

        let bytes = header.encode();
        let decoded = DnsHeader::decode(&mut Reader::new(&bytes, bytes.len())).unwrap();

        assert_eq!(decoded.id, 0x1234);
        assert_eq!(decoded.num_answers, 2);
        assert_eq!(decoded.num_additionals, 1);
        assert_eq!(decoded.rcode(), ResponseCode::NxDomain);
    }

    #[test]
    fn opt_record_wire_image() {
        assert_eq!(encode_opt(4096), vec![0, 0, 41, 0x10, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn packet_roundtrips_all_sections() {
        let mut packet = DnsPacket::new(DnsHeader::new(7, FLAG_RESPONSE));
        packet.answers.push(DnsRecord::a(
            name("example.com"),
            "93.184.216.34".parse().unwrap(),
            60,
        ));
        packet
            .authorities
            .push(DnsRecord::ns(name("com"), name("a.gtld-servers.net"), 300));
        packet.additionals.push(DnsRecord::a(
            name("a.gtld-servers.net"),
            "192.5.6.30".parse().unwrap(),
            300,
        ));

        let bytes = packet.encode().unwrap();
        let decoded = DnsPacket::decode(&mut Reader::new(&bytes, bytes.len())).unwrap();

        assert_eq!(decoded.answers.len(), 1);
        assert_eq!(decoded.authorities.len(), 1);
        assert_eq!(decoded.additionals.len(), 1);
        assert_eq!(decoded.first_answer().as_deref(), Some("93.184.216.34"));
        assert!(matches!(decoded.authorities[0].data, RecordData::Ns(_)));
    }

    #[test]
    fn truncated_packet_is_an_error_not_a_panic() {
        let mut packet = DnsPacket::new(DnsHeader::new(7, FLAG_RESPONSE));
        packet.answers.push(DnsRecord::a(
            name("example.com"),
            "203.0.113.1".parse().unwrap(),
            60,
        ));
        let bytes = packet.encode().unwrap();

        for cut in [1, 12, bytes.len() - 1] {
            let result = DnsPacket::decode(&mut Reader::new(&bytes, cut));
            assert!(result.is_err(), "decode of {cut}-byte prefix must fail");
        }
    }

    #[test]
    fn unknown_record_type_is_skipped_whole() {
        // A TXT record between two A records must not derail decoding.
        let mut buf = DnsHeader::new(1, FLAG_RESPONSE).encode();
        buf[7] = 2; // num_answers

        buf.extend(name("example.com").encode().unwrap());
        buf.extend(16u16.to_be_bytes()); // TXT
        buf.extend(CLASS_IN.to_be_bytes());
        buf.extend(60u32.to_be_bytes());
        buf.extend(4u16.to_be_bytes());
        buf.extend(b"\x03abc");

        buf.extend(
            DnsRecord::a(name("example.com"), "198.51.100.4".parse().unwrap(), 60)
                .encode()
                .unwrap(),
        );

        let decoded = DnsPacket::decode(&mut Reader::new(&buf, buf.len())).unwrap();
        assert!(matches!(decoded.answers[0].data, RecordData::Other));
        assert_eq!(decoded.answers[1].presentable(), "198.51.100.4");
    }

    #[test]
    fn response_code_names() {
        assert_eq!(ResponseCode::from_u8(3), ResponseCode::NxDomain);
        assert_eq!(ResponseCode::from_u8(2).to_string(), "SERVFAIL");
        assert_eq!(ResponseCode::from_u8(9).to_string(), "RCODE9");
    }
}
