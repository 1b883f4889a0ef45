//! Serialize/deserialize 9P messages into/from binary.
//!
//! Stat and Msg are encoded/decoded through dedicated functions rather
//! than the generic `Encodable`/`Decodable` traits because whether the
//! 9P2000.u extension fields are present depends on the connection's
//! negotiated `dotu` flag, a piece of context the generic traits have no
//! room for.

use crate::{fcall::*, io_err, res};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_traits::FromPrimitive;
use std::io::{Read, Result};
use std::mem;
use std::ops::{Shl, Shr};

macro_rules! decode {
    ($decoder:expr) => {
        Decodable::decode(&mut $decoder)?
    };

    ($typ:ident, $buf:expr) => {
        $typ::from_bits_truncate(decode!($buf))
    };
}

fn read_exact<R: Read + ?Sized>(r: &mut R, size: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0; size];
    r.read_exact(&mut buf[..]).and(Ok(buf))
}

/// A serializing specific result to overload operators on `Result`
///
/// # Overloaded operators
/// <<, >>, ?
pub struct SResult<T>(::std::io::Result<T>);

/// A wrapper class of WriteBytesExt to provide operator overloads
/// for serializing
///
/// Operator '<<' serializes the right hand side argument into
/// the left hand side encoder
#[derive(Clone, Debug)]
pub struct Encoder<W> {
    writer: W,
    bytes: usize,
}

impl<W: WriteBytesExt> Encoder<W> {
    pub fn new(writer: W) -> Encoder<W> {
        Encoder { writer, bytes: 0 }
    }

    /// Return total bytes written
    pub fn bytes_written(&self) -> usize {
        self.bytes
    }

    /// Encode data, equivalent to: decoder << data
    pub fn encode<T: Encodable>(&mut self, data: &T) -> Result<usize> {
        let bytes = data.encode(&mut self.writer)?;
        self.bytes += bytes;
        Ok(bytes)
    }

    /// Get inner writer
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Borrow the inner writer, for callers (like dotu-aware Stat
    /// encoding) that need to bypass the `Encodable` trait.
    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }
}

impl<'a, T: Encodable, W: WriteBytesExt> Shl<&'a T> for Encoder<W> {
    type Output = SResult<Encoder<W>>;
    fn shl(mut self, rhs: &'a T) -> Self::Output {
        match self.encode(rhs) {
            Ok(_) => SResult(Ok(self)),
            Err(e) => SResult(Err(e)),
        }
    }
}

impl<'a, T: Encodable, W: WriteBytesExt> Shl<&'a T> for SResult<Encoder<W>> {
    type Output = Self;
    fn shl(self, rhs: &'a T) -> Self::Output {
        match self.0 {
            Ok(mut encoder) => match encoder.encode(rhs) {
                Ok(_) => SResult(Ok(encoder)),
                Err(e) => SResult(Err(e)),
            },
            Err(e) => SResult(Err(e)),
        }
    }
}

/// A wrapper class of ReadBytesExt to provide operator overloads
/// for deserializing
#[derive(Clone, Debug)]
pub struct Decoder<R> {
    reader: R,
}

impl<R: ReadBytesExt> Decoder<R> {
    pub fn new(reader: R) -> Decoder<R> {
        Decoder { reader }
    }
    pub fn decode<T: Decodable>(&mut self) -> Result<T> {
        Decodable::decode(&mut self.reader)
    }
    /// Get inner reader
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<'a, T: Decodable, R: ReadBytesExt> Shr<&'a mut T> for Decoder<R> {
    type Output = SResult<Decoder<R>>;
    fn shr(mut self, rhs: &'a mut T) -> Self::Output {
        match self.decode() {
            Ok(r) => {
                *rhs = r;
                SResult(Ok(self))
            }
            Err(e) => SResult(Err(e)),
        }
    }
}

impl<'a, T: Decodable, R: ReadBytesExt> Shr<&'a mut T> for SResult<Decoder<R>> {
    type Output = Self;
    fn shr(self, rhs: &'a mut T) -> Self::Output {
        match self.0 {
            Ok(mut decoder) => match decoder.decode() {
                Ok(r) => {
                    *rhs = r;
                    SResult(Ok(decoder))
                }
                Err(e) => SResult(Err(e)),
            },
            Err(e) => SResult(Err(e)),
        }
    }
}

/// Trait representing a type which can be serialized into binary
pub trait Encodable {
    /// Encode self to w and returns the number of bytes encoded
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize>;
}

impl Encodable for u8 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_u8(*self).and(Ok(mem::size_of::<Self>()))
    }
}

impl Encodable for u16 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_u16::<LittleEndian>(*self)
            .and(Ok(mem::size_of::<Self>()))
    }
}

impl Encodable for u32 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_u32::<LittleEndian>(*self)
            .and(Ok(mem::size_of::<Self>()))
    }
}

impl Encodable for u64 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_u64::<LittleEndian>(*self)
            .and(Ok(mem::size_of::<Self>()))
    }
}

impl Encodable for String {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        let mut bytes = (self.len() as u16).encode(w)?;
        bytes += w.write_all(self.as_bytes()).and(Ok(self.len()))?;
        Ok(bytes)
    }
}

impl Encodable for Qid {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w) << &self.typ.bits() << &self.version << &self.path {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for Data {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        let size = self.0.len();
        let bytes = (size as u32).encode(w)? + size;
        w.write_all(&self.0)?;
        Ok(bytes)
    }
}

impl<T: Encodable> Encodable for Vec<T> {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match self
            .iter()
            .fold(Encoder::new(w) << &(self.len() as u16), |acc, s| acc << s)
        {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

/// Encode a `Stat` record, including the 9P2000.u extension fields only
/// when `dotu` is set.
pub fn encode_stat<W: WriteBytesExt>(stat: &Stat, w: &mut W, dotu: bool) -> Result<usize> {
    let size = stat.size(dotu);
    let buf = Encoder::new(w)
        << &size
        << &stat.typ
        << &stat.dev
        << &stat.qid
        << &stat.mode
        << &stat.atime
        << &stat.mtime
        << &stat.length
        << &stat.name
        << &stat.uid
        << &stat.gid
        << &stat.muid;

    let buf = if dotu {
        buf << &stat.extension << &stat.n_uid << &stat.n_gid << &stat.n_muid
    } else {
        buf
    };

    match buf {
        SResult(Ok(enc)) => Ok(enc.bytes_written()),
        SResult(Err(e)) => Err(e),
    }
}

/// Decode a `Stat` record, reading the 9P2000.u extension fields only
/// when `dotu` is set.
pub fn decode_stat<R: ReadBytesExt>(r: &mut R, dotu: bool) -> Result<Stat> {
    let _size: u16 = Decodable::decode(r)?;
    let typ = Decodable::decode(r)?;
    let dev = Decodable::decode(r)?;
    let qid = Decodable::decode(r)?;
    let mode = Decodable::decode(r)?;
    let atime = Decodable::decode(r)?;
    let mtime = Decodable::decode(r)?;
    let length = Decodable::decode(r)?;
    let name = Decodable::decode(r)?;
    let uid = Decodable::decode(r)?;
    let gid = Decodable::decode(r)?;
    let muid = Decodable::decode(r)?;

    let (extension, n_uid, n_gid, n_muid) = if dotu {
        (
            Decodable::decode(r)?,
            Decodable::decode(r)?,
            Decodable::decode(r)?,
            Decodable::decode(r)?,
        )
    } else {
        (String::new(), NOUID_PLACEHOLDER, NOUID_PLACEHOLDER, NOUID_PLACEHOLDER)
    };

    Ok(Stat {
        typ,
        dev,
        qid,
        mode,
        atime,
        mtime,
        length,
        name,
        uid,
        gid,
        muid,
        extension,
        n_uid,
        n_gid,
        n_muid,
    })
}

const NOUID_PLACEHOLDER: u32 = !0;

/// Trait representing a type which can be deserialized from binary
pub trait Decodable: Sized {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self>;
}

impl Decodable for u8 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        r.read_u8()
    }
}

impl Decodable for u16 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        r.read_u16::<LittleEndian>()
    }
}

impl Decodable for u32 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        r.read_u32::<LittleEndian>()
    }
}

impl Decodable for u64 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        r.read_u64::<LittleEndian>()
    }
}

impl Decodable for String {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let len: u16 = Decodable::decode(r)?;
        String::from_utf8(read_exact(r, len as usize)?)
            .map_err(|_| io_err!(Other, "Invalid UTF-8 sequence"))
    }
}

impl Decodable for Qid {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(Qid {
            typ: decode!(QidType, *r),
            version: Decodable::decode(r)?,
            path: Decodable::decode(r)?,
        })
    }
}

impl Decodable for Data {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let len: u32 = Decodable::decode(r)?;
        Ok(Data(read_exact(r, len as usize)?))
    }
}

impl<T: Decodable> Decodable for Vec<T> {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let len: u16 = Decodable::decode(r)?;
        let mut buf = Vec::new();
        for _ in 0..len {
            buf.push(Decodable::decode(r)?);
        }
        Ok(buf)
    }
}

/// Encode a full message, given the connection's negotiated `dotu` flag.
pub fn encode_msg<W: WriteBytesExt>(msg: &Msg, w: &mut W, dotu: bool) -> Result<usize> {
    use FCall::*;

    let typ = MsgType::from(&msg.body);
    let mut enc = Encoder::new(w);
    let mut bytes = enc.encode(&(typ as u8))? + enc.encode(&msg.tag)?;

    bytes += match msg.body {
        TVersion {
            ref msize,
            ref version,
        } => enc.encode(msize)? + enc.encode(version)?,
        RVersion {
            ref msize,
            ref version,
        } => enc.encode(msize)? + enc.encode(version)?,
        TAuth {
            ref afid,
            ref uname,
            ref aname,
            ref n_uname,
        } => enc.encode(afid)? + enc.encode(uname)? + enc.encode(aname)? + enc.encode(n_uname)?,
        RAuth { ref aqid } => enc.encode(aqid)?,
        TAttach {
            ref fid,
            ref afid,
            ref uname,
            ref aname,
            ref n_uname,
        } => {
            enc.encode(fid)?
                + enc.encode(afid)?
                + enc.encode(uname)?
                + enc.encode(aname)?
                + enc.encode(n_uname)?
        }
        RAttach { ref qid } => enc.encode(qid)?,
        RError {
            ref ename,
            ref errno,
        } => enc.encode(ename)? + enc.encode(errno)?,
        TFlush { ref oldtag } => enc.encode(oldtag)?,
        RFlush => 0,
        TWalk {
            ref fid,
            ref newfid,
            ref wnames,
        } => enc.encode(fid)? + enc.encode(newfid)? + enc.encode(wnames)?,
        RWalk { ref wqids } => enc.encode(wqids)?,
        TOpen { ref fid, ref mode } => enc.encode(fid)? + enc.encode(mode)?,
        ROpen {
            ref qid,
            ref iounit,
        } => enc.encode(qid)? + enc.encode(iounit)?,
        TCreate {
            ref fid,
            ref name,
            ref perm,
            ref mode,
        } => enc.encode(fid)? + enc.encode(name)? + enc.encode(perm)? + enc.encode(mode)?,
        RCreate {
            ref qid,
            ref iounit,
        } => enc.encode(qid)? + enc.encode(iounit)?,
        TRead {
            ref fid,
            ref offset,
            ref count,
        } => enc.encode(fid)? + enc.encode(offset)? + enc.encode(count)?,
        RRead { ref data } => enc.encode(data)?,
        TWrite {
            ref fid,
            ref offset,
            ref data,
        } => enc.encode(fid)? + enc.encode(offset)? + enc.encode(data)?,
        RWrite { ref count } => enc.encode(count)?,
        TClunk { ref fid } => enc.encode(fid)?,
        RClunk => 0,
        TRemove { ref fid } => enc.encode(fid)?,
        RRemove => 0,
        TStat { ref fid } => enc.encode(fid)?,
        RStat { ref stat } => encode_stat(stat, enc.writer_mut(), dotu)?,
        TWstat { ref fid, ref stat } => {
            enc.encode(fid)? + encode_stat(stat, enc.writer_mut(), dotu)?
        }
        RWstat => 0,
    };

    Ok(bytes)
}

/// Decode a full message, given the connection's negotiated `dotu` flag.
pub fn decode_msg<R: ReadBytesExt>(r: &mut R, dotu: bool) -> Result<Msg> {
    use MsgType::*;

    let mut buf = r;

    let msg_type = MsgType::from_u8(decode!(buf));
    let tag = decode!(buf);
    let body = match msg_type {
        Some(TVersion) => FCall::TVersion {
            msize: decode!(buf),
            version: decode!(buf),
        },
        Some(RVersion) => FCall::RVersion {
            msize: decode!(buf),
            version: decode!(buf),
        },
        Some(TAuth) => FCall::TAuth {
            afid: decode!(buf),
            uname: decode!(buf),
            aname: decode!(buf),
            n_uname: decode!(buf),
        },
        Some(RAuth) => FCall::RAuth { aqid: decode!(buf) },
        Some(TAttach) => FCall::TAttach {
            fid: decode!(buf),
            afid: decode!(buf),
            uname: decode!(buf),
            aname: decode!(buf),
            n_uname: decode!(buf),
        },
        Some(RAttach) => FCall::RAttach { qid: decode!(buf) },
        Some(RError) => FCall::RError {
            ename: decode!(buf),
            errno: decode!(buf),
        },
        Some(TFlush) => FCall::TFlush {
            oldtag: decode!(buf),
        },
        Some(RFlush) => FCall::RFlush,
        Some(TWalk) => FCall::TWalk {
            fid: decode!(buf),
            newfid: decode!(buf),
            wnames: decode!(buf),
        },
        Some(RWalk) => FCall::RWalk {
            wqids: decode!(buf),
        },
        Some(TOpen) => FCall::TOpen {
            fid: decode!(buf),
            mode: decode!(buf),
        },
        Some(ROpen) => FCall::ROpen {
            qid: decode!(buf),
            iounit: decode!(buf),
        },
        Some(TCreate) => FCall::TCreate {
            fid: decode!(buf),
            name: decode!(buf),
            perm: decode!(buf),
            mode: decode!(buf),
        },
        Some(RCreate) => FCall::RCreate {
            qid: decode!(buf),
            iounit: decode!(buf),
        },
        Some(TRead) => FCall::TRead {
            fid: decode!(buf),
            offset: decode!(buf),
            count: decode!(buf),
        },
        Some(RRead) => FCall::RRead { data: decode!(buf) },
        Some(TWrite) => FCall::TWrite {
            fid: decode!(buf),
            offset: decode!(buf),
            data: decode!(buf),
        },
        Some(RWrite) => FCall::RWrite {
            count: decode!(buf),
        },
        Some(TClunk) => FCall::TClunk { fid: decode!(buf) },
        Some(RClunk) => FCall::RClunk,
        Some(TRemove) => FCall::TRemove { fid: decode!(buf) },
        Some(RRemove) => FCall::RRemove,
        Some(TStat) => FCall::TStat { fid: decode!(buf) },
        Some(RStat) => FCall::RStat {
            stat: decode_stat(&mut buf, dotu)?,
        },
        Some(TWstat) => {
            let fid = decode!(buf);
            let stat = decode_stat(&mut buf, dotu)?;
            FCall::TWstat { fid, stat }
        }
        Some(RWstat) => FCall::RWstat,
        None => return res!(io_err!(Other, "Invalid message type")),
    };

    Ok(Msg { tag, body })
}

/// Helper function to read a 9P message from a byte-oriented stream
pub fn read_msg<R: ReadBytesExt>(r: &mut R, dotu: bool) -> Result<Msg> {
    decode_msg(r, dotu)
}

/// Helper function to write a 9P message into a byte-oriented stream
pub fn write_msg<W: WriteBytesExt>(w: &mut W, msg: &Msg, dotu: bool) -> Result<usize> {
    encode_msg(msg, w, dotu)
}

#[test]
fn encoder_test1() {
    let expected: Vec<u8> = (0..10).collect();
    let mut encoder = Vec::new();
    for i in 0..10 {
        (&(i as u8)).encode(&mut encoder).unwrap();
    }
    assert_eq!(expected, encoder);
}

#[test]
fn decoder_test1() {
    use std::io::Cursor;

    let expected: Vec<u8> = (0..10).collect();
    let mut decoder = Cursor::new(expected.clone());
    let mut actual: Vec<u8> = Vec::new();
    loop {
        match Decodable::decode(&mut decoder) {
            Ok(i) => actual.push(i),
            Err(_) => break,
        }
    }
    assert_eq!(expected, actual);
}

#[test]
fn msg_encode_decode_version() {
    use std::io::Cursor;

    let expected = Msg {
        tag: 0xdead,
        body: FCall::RVersion {
            msize: 8192,
            version: P92000.to_owned(),
        },
    };
    let mut buf = Vec::new();
    encode_msg(&expected, &mut buf, false).unwrap();

    let mut readbuf = Cursor::new(buf);
    let actual = decode_msg(&mut readbuf, false).unwrap();

    assert_eq!(expected, actual);
}

#[test]
fn msg_encode_decode_stat_dotu() {
    use std::io::Cursor;

    let stat = Stat {
        typ: 0,
        dev: 0,
        qid: Qid {
            typ: QidType::DIR,
            version: 1,
            path: 42,
        },
        mode: dm::DIR | 0o755,
        atime: 0,
        mtime: 0,
        length: 0,
        name: "foo".to_owned(),
        uid: "alice".to_owned(),
        gid: "wheel".to_owned(),
        muid: "alice".to_owned(),
        extension: String::new(),
        n_uid: 1000,
        n_gid: 100,
        n_muid: 1000,
    };
    let expected = Msg {
        tag: 1,
        body: FCall::RStat { stat },
    };

    let mut buf = Vec::new();
    encode_msg(&expected, &mut buf, true).unwrap();

    let mut readbuf = Cursor::new(buf);
    let actual = decode_msg(&mut readbuf, true).unwrap();

    assert_eq!(expected, actual);
}
