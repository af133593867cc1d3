//! Messages: an owned byte container split into a header and a body.
//!
//! Protocol layers keep their metadata (request ids, correlation cookies) in
//! the header so the application payload in the body is never touched. Both
//! regions can grow and shrink at either end.

use std::fmt;

use byteorder::{BigEndian, ByteOrder};

use crate::{
    error::{Error, Result},
    hex::HexDisplayExt,
    socket::PipeId,
};

/// Selects one of the two independent regions of a [`Msg`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Region {
    Header,
    Body,
}

/// A growable buffer with a read cursor, so consuming from the front is just
/// a cursor bump and the freed space is reused by later prepends.
#[derive(Clone, Default)]
struct Chunk {
    buf: Vec<u8>,
    start: usize,
}

impl Chunk {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            start: 0,
        }
    }

    fn as_slice(&self) -> &[u8] {
        &self.buf[self.start..]
    }

    fn len(&self) -> usize {
        self.buf.len() - self.start
    }

    fn append(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    fn prepend(&mut self, data: &[u8]) {
        if data.len() <= self.start {
            self.start -= data.len();
            self.buf[self.start..self.start + data.len()].copy_from_slice(data);
        } else {
            let mut buf = Vec::with_capacity(data.len() + self.len());
            buf.extend_from_slice(data);
            buf.extend_from_slice(self.as_slice());
            self.buf = buf;
            self.start = 0;
        }
    }

    fn ensure(&self, wanted: usize) -> Result<()> {
        let available = self.len();
        if wanted > available {
            return Err(Error::Underflow { wanted, available });
        }
        Ok(())
    }

    fn advance(&mut self, n: usize) {
        self.start += n;
        if self.start == self.buf.len() {
            self.clear();
        }
    }

    fn consume_front(&mut self, n: usize) -> Result<Vec<u8>> {
        self.ensure(n)?;
        let out = self.as_slice()[..n].to_vec();
        self.advance(n);
        Ok(out)
    }

    fn consume_back(&mut self, n: usize) -> Result<Vec<u8>> {
        self.ensure(n)?;
        let out = self.buf.split_off(self.buf.len() - n);
        if self.len() == 0 {
            self.clear();
        }
        Ok(out)
    }

    fn consume_front_u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        let value = BigEndian::read_u32(&self.as_slice()[..4]);
        self.advance(4);
        Ok(value)
    }

    fn consume_back_u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        let at = self.buf.len() - 4;
        let value = BigEndian::read_u32(&self.buf[at..]);
        self.buf.truncate(at);
        if self.len() == 0 {
            self.clear();
        }
        Ok(value)
    }

    fn resize(&mut self, len: usize) {
        self.buf.resize(self.start + len, 0);
    }

    fn clear(&mut self) {
        self.buf.clear();
        self.start = 0;
    }
}

fn u32_bytes(value: u32) -> [u8; 4] {
    let mut bytes = [0u8; 4];
    BigEndian::write_u32(&mut bytes, value);
    bytes
}

/// An owned message.
///
/// Sending a `Msg` moves it into the socket; receiving hands a new one to the
/// caller. Dropping it (or calling [`Msg::release`]) frees the storage, and
/// because `release` consumes the value a double release does not compile.
#[derive(Clone, Default)]
pub struct Msg {
    header: Chunk,
    body: Chunk,
    pipe: Option<PipeId>,
}

impl Msg {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a message with room for `capacity` body bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            header: Chunk::default(),
            body: Chunk::with_capacity(capacity),
            pipe: None,
        }
    }

    pub(crate) fn from_parts(header: Vec<u8>, body: Vec<u8>) -> Self {
        Self {
            header: Chunk {
                buf: header,
                start: 0,
            },
            body: Chunk {
                buf: body,
                start: 0,
            },
            pipe: None,
        }
    }

    fn chunk(&self, region: Region) -> &Chunk {
        match region {
            Region::Header => &self.header,
            Region::Body => &self.body,
        }
    }

    fn chunk_mut(&mut self, region: Region) -> &mut Chunk {
        match region {
            Region::Header => &mut self.header,
            Region::Body => &mut self.body,
        }
    }

    pub fn region(&self, region: Region) -> &[u8] {
        self.chunk(region).as_slice()
    }

    pub fn header(&self) -> &[u8] {
        self.header.as_slice()
    }

    pub fn body(&self) -> &[u8] {
        self.body.as_slice()
    }

    /// Length of the body.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn header_len(&self) -> usize {
        self.header.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.len() == 0
    }

    /// Adds bytes to the back of a region.
    pub fn append_to(&mut self, region: Region, data: &[u8]) {
        self.chunk_mut(region).append(data);
    }

    /// Adds bytes to the front of a region.
    pub fn prepend_to(&mut self, region: Region, data: &[u8]) {
        self.chunk_mut(region).prepend(data);
    }

    /// Removes and returns the first `n` bytes of a region.
    pub fn consume_front(&mut self, region: Region, n: usize) -> Result<Vec<u8>> {
        self.chunk_mut(region).consume_front(n)
    }

    /// Removes and returns the last `n` bytes of a region.
    pub fn consume_back(&mut self, region: Region, n: usize) -> Result<Vec<u8>> {
        self.chunk_mut(region).consume_back(n)
    }

    pub fn append_u32_to(&mut self, region: Region, value: u32) {
        self.append_to(region, &u32_bytes(value));
    }

    pub fn prepend_u32_to(&mut self, region: Region, value: u32) {
        self.prepend_to(region, &u32_bytes(value));
    }

    pub fn consume_front_u32(&mut self, region: Region) -> Result<u32> {
        self.chunk_mut(region).consume_front_u32()
    }

    pub fn consume_back_u32(&mut self, region: Region) -> Result<u32> {
        self.chunk_mut(region).consume_back_u32()
    }

    // Body shorthands.

    pub fn append(&mut self, data: &[u8]) {
        self.append_to(Region::Body, data);
    }

    pub fn insert(&mut self, data: &[u8]) {
        self.prepend_to(Region::Body, data);
    }

    /// Drops `n` bytes from the front of the body.
    pub fn trim(&mut self, n: usize) -> Result<()> {
        self.body.ensure(n)?;
        self.body.advance(n);
        Ok(())
    }

    /// Drops `n` bytes from the back of the body.
    pub fn chop(&mut self, n: usize) -> Result<()> {
        self.consume_back(Region::Body, n).map(drop)
    }

    pub fn append_u32(&mut self, value: u32) {
        self.append_u32_to(Region::Body, value);
    }

    pub fn insert_u32(&mut self, value: u32) {
        self.prepend_u32_to(Region::Body, value);
    }

    pub fn trim_u32(&mut self) -> Result<u32> {
        self.consume_front_u32(Region::Body)
    }

    pub fn chop_u32(&mut self) -> Result<u32> {
        self.consume_back_u32(Region::Body)
    }

    // Header shorthands.

    pub fn header_append(&mut self, data: &[u8]) {
        self.append_to(Region::Header, data);
    }

    pub fn header_insert(&mut self, data: &[u8]) {
        self.prepend_to(Region::Header, data);
    }

    pub fn header_trim(&mut self, n: usize) -> Result<()> {
        self.header.ensure(n)?;
        self.header.advance(n);
        Ok(())
    }

    pub fn header_chop(&mut self, n: usize) -> Result<()> {
        self.consume_back(Region::Header, n).map(drop)
    }

    pub fn header_append_u32(&mut self, value: u32) {
        self.append_u32_to(Region::Header, value);
    }

    pub fn header_insert_u32(&mut self, value: u32) {
        self.prepend_u32_to(Region::Header, value);
    }

    pub fn header_trim_u32(&mut self) -> Result<u32> {
        self.consume_front_u32(Region::Header)
    }

    pub fn header_chop_u32(&mut self) -> Result<u32> {
        self.consume_back_u32(Region::Header)
    }

    /// Resizes the body, zero-filling any new bytes.
    pub fn realloc(&mut self, len: usize) {
        self.body.resize(len);
    }

    /// Empties both regions, keeping the allocations for reuse.
    pub fn clear(&mut self) {
        self.header.clear();
        self.body.clear();
    }

    pub fn clear_body(&mut self) {
        self.body.clear();
    }

    pub fn header_clear(&mut self) {
        self.header.clear();
    }

    /// Deep copy.
    pub fn dup(&self) -> Self {
        self.clone()
    }

    /// Frees the message. Equivalent to dropping it.
    pub fn release(self) {}

    /// The pipe this message arrived on, if it came from a socket.
    pub fn pipe(&self) -> Option<PipeId> {
        self.pipe
    }

    /// Routes the message through a particular pipe. Only raw reply sockets
    /// look at this when sending.
    pub fn set_pipe(&mut self, pipe: Option<PipeId>) {
        self.pipe = pipe;
    }

    pub(crate) fn into_parts(self) -> (Vec<u8>, Vec<u8>) {
        fn into_vec(chunk: Chunk) -> Vec<u8> {
            let Chunk { mut buf, start } = chunk;
            buf.drain(..start);
            buf
        }
        (into_vec(self.header), into_vec(self.body))
    }
}

impl From<&[u8]> for Msg {
    fn from(data: &[u8]) -> Self {
        Self::from_parts(Vec::new(), data.to_vec())
    }
}

impl From<Vec<u8>> for Msg {
    fn from(body: Vec<u8>) -> Self {
        Self::from_parts(Vec::new(), body)
    }
}

impl PartialEq for Msg {
    fn eq(&self, other: &Self) -> bool {
        self.header() == other.header() && self.body() == other.body()
    }
}

impl Eq for Msg {}

impl fmt::Debug for Msg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Msg")
            .field("header", &self.header().hex())
            .field("body", &self.body().hex())
            .field("pipe", &self.pipe)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_body_are_independent() {
        for n in [0usize, 1, 4, 31, 256] {
            let mut msg = Msg::from(&[9u8, 8, 7][..]);
            msg.header_append(&vec![0xaa; n]);
            assert_eq!(msg.body(), &[9, 8, 7]);
            assert_eq!(msg.len(), 3);
            assert_eq!(msg.header_len(), n);

            msg.append(&vec![0x55; n]);
            assert_eq!(msg.header(), vec![0xaa; n].as_slice());
            assert_eq!(msg.len(), 3 + n);
        }
    }

    #[test]
    fn u32_round_trips_from_the_same_end() {
        for value in [0u32, 1, 0x7fff_ffff, 0x8000_0000, 0xdead_beef, u32::MAX] {
            let mut msg = Msg::new();
            msg.append_u32(value);
            assert_eq!(msg.chop_u32(), Ok(value));

            msg.insert_u32(value);
            assert_eq!(msg.trim_u32(), Ok(value));

            msg.header_append_u32(value);
            assert_eq!(msg.header_chop_u32(), Ok(value));
            assert!(msg.is_empty());
            assert_eq!(msg.header_len(), 0);
        }
    }

    #[test]
    fn u32_is_big_endian() {
        let mut msg = Msg::new();
        msg.append_u32(0x0102_0304);
        assert_eq!(msg.body(), &[1, 2, 3, 4]);
    }

    #[test]
    fn consuming_past_the_end_is_an_underflow() {
        let mut msg = Msg::from(&[1u8, 2][..]);
        assert_eq!(
            msg.trim_u32(),
            Err(Error::Underflow {
                wanted: 4,
                available: 2
            })
        );
        // nothing was consumed by the failed call
        assert_eq!(msg.body(), &[1, 2]);
        assert!(msg.header_trim(1).is_err());
        assert!(msg.consume_back(Region::Body, 3).is_err());
    }

    #[test]
    fn consume_from_both_ends() {
        let mut msg = Msg::from(&[1u8, 2, 3, 4, 5, 6][..]);
        assert_eq!(msg.consume_front(Region::Body, 2), Ok(vec![1, 2]));
        assert_eq!(msg.consume_back(Region::Body, 2), Ok(vec![5, 6]));
        assert_eq!(msg.body(), &[3, 4]);
    }

    #[test]
    fn prepend_reuses_trimmed_space() {
        let mut msg = Msg::from(&[0u8, 0, 0, 0, 7][..]);
        msg.trim(4).unwrap();
        msg.insert(&[1, 2]);
        assert_eq!(msg.body(), &[1, 2, 7]);
        msg.insert(&[9, 9, 9, 9]);
        assert_eq!(msg.body(), &[9, 9, 9, 9, 1, 2, 7]);
    }

    #[test]
    fn clear_empties_both_regions() {
        let mut msg = Msg::from(&[1u8, 2, 3][..]);
        msg.header_append(&[4, 5]);
        msg.clear();
        assert!(msg.is_empty());
        assert_eq!(msg.header_len(), 0);
        msg.append_u32(3);
        assert_eq!(msg.body(), &[0, 0, 0, 3]);
    }

    #[test]
    fn realloc_zero_fills() {
        let mut msg = Msg::from(&[1u8][..]);
        msg.realloc(3);
        assert_eq!(msg.body(), &[1, 0, 0]);
        msg.realloc(0);
        assert!(msg.is_empty());
    }

    #[test]
    fn into_parts_drops_consumed_prefix() {
        let mut msg = Msg::from(&[1u8, 2, 3][..]);
        msg.header_append(&[8, 9]);
        msg.trim(1).unwrap();
        msg.header_trim(1).unwrap();
        assert_eq!(msg.into_parts(), (vec![9], vec![2, 3]));
    }
}
