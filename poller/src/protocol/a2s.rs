//! A2S_PLAYER binary query.
//!
//! The exchange is challenge/response: the first request carries challenge
//! `-1`, the server answers with `S2C_CHALLENGE` and a 4-byte token, and the
//! request is repeated with that token. The player reply may be split across
//! several datagrams using the Source-engine split header.

use super::QueryError;
use shared::QUERY_PREFIX;
use tokio::net::UdpSocket;

const A2S_PLAYER: u8 = 0x55;
const S2C_CHALLENGE: u8 = 0x41;
const S2A_PLAYER: u8 = 0x44;
const SPLIT_PREFIX: [u8; 4] = [0xFE, 0xFF, 0xFF, 0xFF];
const SPLIT_HEADER_LEN: usize = 12;
const COMPRESSED_FLAG: u32 = 0x8000_0000;
const MAX_CHALLENGE_ROUNDS: usize = 3;
const PACKET_SIZE: usize = 1400;

/// One entry of an `S2A_PLAYER` reply.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub index: u8,
    pub name: String,
    pub score: i32,
    /// Seconds connected.
    pub duration: f32,
}

pub fn player_request(challenge: [u8; 4]) -> Vec<u8> {
    let mut packet = QUERY_PREFIX.to_vec();
    packet.push(A2S_PLAYER);
    packet.extend_from_slice(&challenge);
    packet
}

/// Runs the challenge handshake and returns the full player reply.
pub(crate) async fn exchange(socket: &UdpSocket) -> Result<Vec<u8>, QueryError> {
    let mut challenge = [0xFF; 4];

    for _ in 0..MAX_CHALLENGE_ROUNDS {
        socket.send(&player_request(challenge)).await?;
        let reply = receive_reply(socket).await?;

        match challenge_token(&reply) {
            Some(token) => challenge = token,
            None => return Ok(reply),
        }
    }

    Err(QueryError::ParseFailure(
        "server kept answering with a challenge".to_string(),
    ))
}

fn challenge_token(reply: &[u8]) -> Option<[u8; 4]> {
    match reply.strip_prefix(&QUERY_PREFIX) {
        Some([S2C_CHALLENGE, a, b, c, d, ..]) => Some([*a, *b, *c, *d]),
        _ => None,
    }
}

async fn receive_reply(socket: &UdpSocket) -> Result<Vec<u8>, QueryError> {
    let mut buffer = vec![0u8; PACKET_SIZE];
    let len = socket.recv(&mut buffer).await?;
    buffer.truncate(len);

    if buffer.starts_with(&QUERY_PREFIX) {
        return Ok(buffer);
    }
    if !buffer.starts_with(&SPLIT_PREFIX) {
        return Err(QueryError::ParseFailure("unknown packet header".to_string()));
    }

    let mut assembler = SplitAssembler::new(parse_split(&buffer)?)?;
    while !assembler.is_complete() {
        let mut buffer = vec![0u8; PACKET_SIZE];
        let len = socket.recv(&mut buffer).await?;
        assembler.add(parse_split(&buffer[..len])?)?;
    }
    assembler.assemble()
}

#[derive(Debug)]
struct SplitPart {
    id: u32,
    total: u8,
    number: u8,
    data: Vec<u8>,
}

fn parse_split(packet: &[u8]) -> Result<SplitPart, QueryError> {
    if packet.len() < SPLIT_HEADER_LEN || !packet.starts_with(&SPLIT_PREFIX) {
        return Err(QueryError::ParseFailure("truncated split header".to_string()));
    }

    let id = u32::from_le_bytes([packet[4], packet[5], packet[6], packet[7]]);
    if id & COMPRESSED_FLAG != 0 {
        return Err(QueryError::ParseFailure(
            "compressed split replies are not supported".to_string(),
        ));
    }

    Ok(SplitPart {
        id,
        total: packet[8],
        number: packet[9],
        data: packet[SPLIT_HEADER_LEN..].to_vec(),
    })
}

/// Collects the datagrams of one split reply, in any arrival order.
#[derive(Debug)]
struct SplitAssembler {
    id: u32,
    parts: Vec<Option<Vec<u8>>>,
}

impl SplitAssembler {
    fn new(first: SplitPart) -> Result<Self, QueryError> {
        if first.total == 0 {
            return Err(QueryError::ParseFailure("split reply with zero parts".to_string()));
        }
        let mut assembler = Self {
            id: first.id,
            parts: vec![None; first.total as usize],
        };
        assembler.add(first)?;
        Ok(assembler)
    }

    fn add(&mut self, part: SplitPart) -> Result<(), QueryError> {
        if part.id != self.id || part.total as usize != self.parts.len() {
            return Err(QueryError::ParseFailure("mismatched split reply".to_string()));
        }
        let slot = self
            .parts
            .get_mut(part.number as usize)
            .ok_or_else(|| QueryError::ParseFailure("split part out of range".to_string()))?;
        *slot = Some(part.data);
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.parts.iter().all(Option::is_some)
    }

    fn assemble(self) -> Result<Vec<u8>, QueryError> {
        let mut payload = Vec::new();
        for part in self.parts {
            let data = part.ok_or_else(|| QueryError::ParseFailure("missing split part".to_string()))?;
            payload.extend_from_slice(&data);
        }
        Ok(payload)
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], QueryError> {
        let end = self.pos + n;
        let bytes = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| QueryError::ParseFailure("truncated player record".to_string()))?;
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, QueryError> {
        Ok(self.take(1)?[0])
    }

    fn array4(&mut self) -> Result<[u8; 4], QueryError> {
        let bytes = self.take(4)?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn cstring(&mut self) -> Result<String, QueryError> {
        let rest = &self.buf[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| QueryError::ParseFailure("unterminated player name".to_string()))?;
        let value = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.pos += len + 1;
        Ok(value)
    }
}

/// Decodes an `S2A_PLAYER` reply into player records.
pub fn decode_players(payload: &[u8]) -> Result<Vec<PlayerRecord>, QueryError> {
    let mut reader = Reader::new(payload);
    if reader.take(4)? != QUERY_PREFIX {
        return Err(QueryError::ParseFailure("missing connectionless header".to_string()));
    }
    let kind = reader.u8()?;
    if kind != S2A_PLAYER {
        return Err(QueryError::ParseFailure(format!(
            "unexpected reply type 0x{:02X}",
            kind
        )));
    }

    let count = reader.u8()?;
    let mut players = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let index = reader.u8()?;
        let name = reader.cstring()?;
        let score = i32::from_le_bytes(reader.array4()?);
        let duration = f32::from_le_bytes(reader.array4()?);
        players.push(PlayerRecord {
            index,
            name,
            score,
            duration,
        });
    }
    Ok(players)
}
