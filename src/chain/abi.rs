//! The slice of the Solidity ABI the voting contract needs: `uint256` (up to
//! 128 bits), `address`, `bool`, `string` and `uint256[]`.

use anyhow::{anyhow, bail, ensure};
use sha3::{Digest, Keccak256};

const WORD: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Uint(u128),
    Address([u8; 20]),
    Bool(bool),
    String(String),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        matches!(self, Token::String(_))
    }
}

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = WORD * tokens.len();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
        }
        match token {
            Token::Uint(value) => head.extend_from_slice(&uint_word(*value)),
            Token::Address(address) => {
                head.extend_from_slice(&[0u8; 12]);
                head.extend_from_slice(address);
            }
            Token::Bool(value) => head.extend_from_slice(&uint_word(*value as u128)),
            Token::String(value) => {
                let bytes = value.as_bytes();
                tail.extend_from_slice(&uint_word(bytes.len() as u128));
                tail.extend_from_slice(bytes);
                tail.resize(tail.len() + padding(bytes.len()), 0);
            }
        }
    }

    head.extend(tail);
    head
}

/// Selector followed by the encoded arguments.
pub fn call_data(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend(encode(tokens));
    data
}

fn padding(len: usize) -> usize {
    (WORD - len % WORD) % WORD
}

pub fn parse_address(address: &str) -> anyhow::Result<[u8; 20]> {
    let hex_part = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| anyhow!("address {address:?} is missing the 0x prefix"))?;
    let bytes = hex::decode(hex_part).map_err(|e| anyhow!("address {address:?} is not hex: {e}"))?;
    bytes
        .try_into()
        .map_err(|_| anyhow!("address {address:?} is not 20 bytes"))
}

pub fn format_address(address: &[u8; 20]) -> String {
    format!("0x{}", hex::encode(address))
}

/// Reads a return value's head slots in order, following offsets for dynamic types.
pub struct Decoder<'a> {
    data: &'a [u8],
    slot: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, slot: 0 }
    }

    fn slice(&self, start: usize, len: usize) -> anyhow::Result<&'a [u8]> {
        start
            .checked_add(len)
            .and_then(|end| self.data.get(start..end))
            .ok_or_else(|| anyhow!("return data too short: wanted {len} bytes at {start}, have {}", self.data.len()))
    }

    fn word_at(&self, offset: usize) -> anyhow::Result<&'a [u8]> {
        self.slice(offset, WORD)
    }

    fn next_word(&mut self) -> anyhow::Result<&'a [u8]> {
        let word = self.word_at(self.slot * WORD)?;
        self.slot += 1;
        Ok(word)
    }

    /// Where the data for a dynamic value starts: just past its length word.
    fn after(offset: usize) -> anyhow::Result<usize> {
        offset.checked_add(WORD).ok_or_else(|| anyhow!("offset {offset} out of range"))
    }

    fn word_to_uint(word: &[u8]) -> anyhow::Result<u128> {
        ensure!(word[..16].iter().all(|b| *b == 0), "uint256 does not fit in 128 bits");
        let mut low = [0u8; 16];
        low.copy_from_slice(&word[16..]);
        Ok(u128::from_be_bytes(low))
    }

    fn word_to_offset(word: &[u8]) -> anyhow::Result<usize> {
        usize::try_from(Self::word_to_uint(word)?).map_err(|_| anyhow!("offset out of range"))
    }

    pub fn uint(&mut self) -> anyhow::Result<u128> {
        Self::word_to_uint(self.next_word()?)
    }

    pub fn u64(&mut self) -> anyhow::Result<u64> {
        u64::try_from(self.uint()?).map_err(|_| anyhow!("uint256 does not fit in 64 bits"))
    }

    pub fn bool(&mut self) -> anyhow::Result<bool> {
        match self.uint()? {
            0 => Ok(false),
            1 => Ok(true),
            other => bail!("invalid bool word {other}"),
        }
    }

    pub fn address(&mut self) -> anyhow::Result<String> {
        let word = self.next_word()?;
        ensure!(word[..12].iter().all(|b| *b == 0), "address has dirty high bytes");
        let mut address = [0u8; 20];
        address.copy_from_slice(&word[12..]);
        Ok(format_address(&address))
    }

    pub fn string(&mut self) -> anyhow::Result<String> {
        let offset = Self::word_to_offset(self.next_word()?)?;
        let len = Self::word_to_offset(self.word_at(offset)?)?;
        let bytes = self.slice(Self::after(offset)?, len)?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    pub fn uint_array(&mut self) -> anyhow::Result<Vec<u128>> {
        let offset = Self::word_to_offset(self.next_word()?)?;
        let len = Self::word_to_offset(self.word_at(offset)?)?;
        let elements = self.slice(
            Self::after(offset)?,
            len.checked_mul(WORD).ok_or_else(|| anyhow!("array of {len} elements out of range"))?,
        )?;
        elements.chunks_exact(WORD).map(Self::word_to_uint).collect()
    }
}
