//! DNS message parsing and construction.
//!
//! Only the pieces the cache needs: the question of an inbound query, the
//! answer and additional records of an upstream response, and encoding of
//! a reply built from cached data.

use std::net::{Ipv4Addr, Ipv6Addr};

use thiserror::Error;

const HEADER_LEN: usize = 12;
const RR_FIXED_LEN: usize = 10;
const MAX_POINTER_HOPS: usize = 16;

const QR_FLAG: u16 = 0x8000;
/// QR=1, RA=1, RCODE=0.
const RESPONSE_FLAGS: u16 = 0x8080;
/// Opcode and RD bits carried over from the query.
const ECHOED_FLAGS: u16 = 0x7900;

/// Reasons a datagram could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnsError {
    #[error("message truncated")]
    Truncated,
    #[error("message has no question")]
    NoQuestion,
    #[error("message is a response, not a query")]
    NotAQuery,
    #[error("invalid label in name")]
    InvalidLabel,
    #[error("too many compression pointers in name")]
    PointerLoop,
    #[error("bad rdata for type {rtype}: {len} bytes")]
    BadRdata { rtype: u16, len: usize },
}

/// The record types the cache stores. Everything else is forwarded untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Ns,
    Ptr,
    Aaaa,
}

impl RecordType {
    pub const ALL: [RecordType; 4] = [
        RecordType::A,
        RecordType::Aaaa,
        RecordType::Ns,
        RecordType::Ptr,
    ];

    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(RecordType::A),
            2 => Some(RecordType::Ns),
            12 => Some(RecordType::Ptr),
            28 => Some(RecordType::Aaaa),
            _ => None,
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Ns => 2,
            RecordType::Ptr => 12,
            RecordType::Aaaa => 28,
        }
    }
}

/// Validated payload of a supported record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ns(String),
    Ptr(String),
}

impl RecordData {
    pub fn record_type(&self) -> RecordType {
        match self {
            RecordData::A(_) => RecordType::A,
            RecordData::Aaaa(_) => RecordType::Aaaa,
            RecordData::Ns(_) => RecordType::Ns,
            RecordData::Ptr(_) => RecordType::Ptr,
        }
    }

    fn to_rdata(&self) -> Vec<u8> {
        match self {
            RecordData::A(addr) => addr.octets().to_vec(),
            RecordData::Aaaa(addr) => addr.octets().to_vec(),
            RecordData::Ns(name) | RecordData::Ptr(name) => {
                let mut buf = Vec::with_capacity(name.len() + 2);
                DnsResponse::encode_domain(&mut buf, name);
                buf
            }
        }
    }
}

/// A supported record extracted from an upstream response.
///
/// This is the only shape the cache update path sees; it never touches the
/// wire layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    pub name: String,
    pub ttl: u32,
    pub data: RecordData,
}

/// A parsed DNS query.
#[derive(Debug, Clone)]
pub struct DnsQuery {
    pub id: u16,
    pub flags: u16,
    /// Lowercased, without the trailing dot. The root is `""`.
    pub domain: String,
    pub qtype: u16,
    pub qclass: u16,
    /// The first question exactly as it arrived, echoed back in replies.
    question: Vec<u8>,
}

impl DnsQuery {
    /// Parse the header and first question of a DNS query.
    ///
    /// Messages with QR set are rejected.
    pub fn parse(data: &[u8]) -> Result<Self, DnsError> {
        let query = Self::parse_message(data)?;
        if query.flags & QR_FLAG != 0 {
            return Err(DnsError::NotAQuery);
        }
        Ok(query)
    }

    /// Parse the header and first question of any message, query or response.
    pub fn parse_message(data: &[u8]) -> Result<Self, DnsError> {
        if data.len() < HEADER_LEN {
            return Err(DnsError::Truncated);
        }

        let id = read_u16(data, 0);
        let flags = read_u16(data, 2);
        if read_u16(data, 4) == 0 {
            return Err(DnsError::NoQuestion);
        }

        let (domain, pos) = read_name(data, HEADER_LEN)?;
        if pos + 4 > data.len() {
            return Err(DnsError::Truncated);
        }

        Ok(Self {
            id,
            flags,
            domain,
            qtype: read_u16(data, pos),
            qclass: read_u16(data, pos + 2),
            question: data[HEADER_LEN..pos + 4].to_vec(),
        })
    }

    /// The cacheable type this query asks for, if any.
    pub fn record_type(&self) -> Option<RecordType> {
        RecordType::from_u16(self.qtype)
    }

    /// Encode a reply to this query carrying `data` as the answer section,
    /// every answer stamped with `ttl`.
    ///
    /// The question is copied byte for byte, so letter case survives.
    pub fn answer(&self, ttl: u32, data: &[RecordData]) -> Vec<u8> {
        let mut reply = Vec::with_capacity(HEADER_LEN + self.question.len() + data.len() * 32);

        reply.extend_from_slice(&self.id.to_be_bytes());
        reply.extend_from_slice(&(RESPONSE_FLAGS | (self.flags & ECHOED_FLAGS)).to_be_bytes());
        reply.extend_from_slice(&[0x00, 0x01]); // QDCOUNT
        reply.extend_from_slice(&(data.len() as u16).to_be_bytes());
        reply.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // NSCOUNT, ARCOUNT
        reply.extend_from_slice(&self.question);

        for item in data {
            let record = DnsRecord::from_data(&self.domain, self.qclass, ttl, item);
            DnsResponse::encode_record(&mut reply, &record, true);
        }

        reply
    }
}

/// A DNS response.
#[derive(Debug, Clone)]
pub struct DnsResponse {
    pub id: u16,
    pub flags: u16,
    pub questions: Vec<DnsQuestion>,
    pub answers: Vec<DnsRecord>,
    pub additionals: Vec<DnsRecord>,
}

/// A DNS question section entry.
#[derive(Debug, Clone)]
pub struct DnsQuestion {
    pub domain: String,
    pub qtype: u16,
    pub qclass: u16,
}

/// A DNS resource record.
#[derive(Debug, Clone)]
pub struct DnsRecord {
    pub name: String,
    pub rtype: u16,
    pub class: u16,
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

impl DnsRecord {
    pub fn from_data(name: &str, class: u16, ttl: u32, data: &RecordData) -> Self {
        Self {
            name: name.to_string(),
            rtype: data.record_type().to_u16(),
            class,
            ttl,
            rdata: data.to_rdata(),
        }
    }
}

impl DnsResponse {
    /// Encode the response to wire format bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(512);

        // Header
        data.extend_from_slice(&self.id.to_be_bytes());
        data.extend_from_slice(&self.flags.to_be_bytes());
        data.extend_from_slice(&(self.questions.len() as u16).to_be_bytes());
        data.extend_from_slice(&(self.answers.len() as u16).to_be_bytes());
        data.extend_from_slice(&[0x00, 0x00]); // NSCOUNT
        data.extend_from_slice(&(self.additionals.len() as u16).to_be_bytes());

        // Questions
        for q in &self.questions {
            Self::encode_domain(&mut data, &q.domain);
            data.extend_from_slice(&q.qtype.to_be_bytes());
            data.extend_from_slice(&q.qclass.to_be_bytes());
        }

        for record in self.answers.iter().chain(&self.additionals) {
            // Use compression pointer if this is the first question's domain
            let points_at_question =
                self.questions.first().is_some_and(|q| q.domain == record.name);
            Self::encode_record(&mut data, record, points_at_question);
        }

        data
    }

    fn encode_record(buf: &mut Vec<u8>, record: &DnsRecord, points_at_question: bool) {
        if points_at_question {
            buf.extend_from_slice(&[0xC0, 0x0C]); // Pointer to offset 12
        } else {
            Self::encode_domain(buf, &record.name);
        }
        buf.extend_from_slice(&record.rtype.to_be_bytes());
        buf.extend_from_slice(&record.class.to_be_bytes());
        buf.extend_from_slice(&record.ttl.to_be_bytes());
        buf.extend_from_slice(&(record.rdata.len() as u16).to_be_bytes());
        buf.extend_from_slice(&record.rdata);
    }

    fn encode_domain(buf: &mut Vec<u8>, domain: &str) {
        for label in domain.split('.').filter(|label| !label.is_empty()) {
            buf.push(label.len() as u8);
            buf.extend_from_slice(label.as_bytes());
        }
        buf.push(0);
    }

    /// Extract every supported record from the answer and additional sections.
    ///
    /// Authority records are stepped over. Records of unsupported types are
    /// skipped, but a malformed record anywhere fails the whole message.
    pub fn parse_records(data: &[u8]) -> Result<Vec<AnswerRecord>, DnsError> {
        if data.len() < HEADER_LEN {
            return Err(DnsError::Truncated);
        }

        let qdcount = read_u16(data, 4) as usize;
        let ancount = read_u16(data, 6) as usize;
        let nscount = read_u16(data, 8) as usize;
        let arcount = read_u16(data, 10) as usize;

        let mut pos = HEADER_LEN;

        // Skip question section
        for _ in 0..qdcount {
            let (_, next) = read_name(data, pos)?;
            pos = next + 4; // QTYPE + QCLASS
        }
        if pos > data.len() {
            return Err(DnsError::Truncated);
        }

        let authority = ancount..ancount + nscount;
        let mut records = Vec::new();

        for index in 0..ancount + nscount + arcount {
            let (name, next) = read_name(data, pos)?;
            if next + RR_FIXED_LEN > data.len() {
                return Err(DnsError::Truncated);
            }

            let rtype = read_u16(data, next);
            let ttl = u32::from_be_bytes([
                data[next + 4],
                data[next + 5],
                data[next + 6],
                data[next + 7],
            ]);
            let rdlength = read_u16(data, next + 8) as usize;

            let rdata_start = next + RR_FIXED_LEN;
            let rdata_end = rdata_start + rdlength;
            if rdata_end > data.len() {
                return Err(DnsError::Truncated);
            }
            pos = rdata_end;

            if authority.contains(&index) {
                continue;
            }
            let Some(kind) = RecordType::from_u16(rtype) else {
                continue;
            };

            let rdata = &data[rdata_start..rdata_end];
            let bad_rdata = || DnsError::BadRdata { rtype, len: rdlength };
            let payload = match kind {
                RecordType::A => {
                    let octets: [u8; 4] = rdata.try_into().map_err(|_| bad_rdata())?;
                    RecordData::A(Ipv4Addr::from(octets))
                }
                RecordType::Aaaa => {
                    let octets: [u8; 16] = rdata.try_into().map_err(|_| bad_rdata())?;
                    RecordData::Aaaa(Ipv6Addr::from(octets))
                }
                RecordType::Ns => RecordData::Ns(read_name(data, rdata_start)?.0),
                RecordType::Ptr => RecordData::Ptr(read_name(data, rdata_start)?.0),
            };

            records.push(AnswerRecord {
                name,
                ttl,
                data: payload,
            });
        }

        Ok(records)
    }
}

fn read_u16(data: &[u8], pos: usize) -> u16 {
    u16::from_be_bytes([data[pos], data[pos + 1]])
}

/// Read a (possibly compressed) name starting at `start`.
///
/// Returns the normalized name and the position just past it in the
/// original byte stream.
fn read_name(data: &[u8], start: usize) -> Result<(String, usize), DnsError> {
    let mut labels = Vec::new();
    let mut pos = start;
    let mut end = None;
    let mut hops = 0;

    loop {
        let len = *data.get(pos).ok_or(DnsError::Truncated)? as usize;

        if len & 0xC0 == 0xC0 {
            let low = *data.get(pos + 1).ok_or(DnsError::Truncated)? as usize;
            hops += 1;
            if hops > MAX_POINTER_HOPS {
                return Err(DnsError::PointerLoop);
            }
            end.get_or_insert(pos + 2);
            pos = ((len & 0x3F) << 8) | low;
            continue;
        }
        if len & 0xC0 != 0 {
            return Err(DnsError::InvalidLabel);
        }

        pos += 1;
        if len == 0 {
            break;
        }

        let label = data.get(pos..pos + len).ok_or(DnsError::Truncated)?;
        let label = std::str::from_utf8(label).map_err(|_| DnsError::InvalidLabel)?;
        labels.push(label.to_ascii_lowercase());
        pos += len;
    }

    Ok((labels.join("."), end.unwrap_or(pos)))
}
