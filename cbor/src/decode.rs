/*!
A pull-model CBOR decoder.

Unlike the [`encode`](crate::encode) side, the decoder accepts both
definite- and indefinite-length items, so that any well-formed RFC 8949
input can be consumed.
*/

use std::str::Utf8Error;
use thiserror::Error;

/// Recursion limit applied when skipping nested items.
const MAX_SKIP_DEPTH: usize = 16;

#[derive(Error, Debug)]
pub enum Error {
    #[error("not enough data for the encoded value")]
    NotEnoughData,

    #[error("sequence has more items to be read")]
    MoreItems,

    #[error("invalid minor-type value {0}")]
    InvalidMinorValue(u8),

    #[error("tags with no following value")]
    JustTags,

    #[error("incorrect type, expecting {0}, found {1}")]
    IncorrectType(&'static str, String),

    #[error("chunked string contains an invalid chunk")]
    InvalidChunk,

    #[error("invalid simple type {0}")]
    InvalidSimpleType(u8),

    #[error("map has a key but no value")]
    PartialMap,

    #[error("maximum recursion depth reached")]
    MaxRecursion,

    #[error(transparent)]
    InvalidUtf8(#[from] Utf8Error),

    #[error(transparent)]
    IntOutOfRange(#[from] std::num::TryFromIntError),

    #[error("loss of floating-point precision")]
    PrecisionLoss,
}

/// A type that can be read from CBOR bytes.
///
/// Returns `Ok(None)` when `data` is empty, and the value plus the number of
/// bytes consumed otherwise.
pub trait FromCbor: Sized {
    type Error;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error>;
}

/// A borrowed view of a single decoded item.
pub enum Value<'a, 'b: 'a> {
    UnsignedInteger(u64),
    NegativeInteger(u64),
    /// Byte string; the flag is true when the string was chunked.
    Bytes(&'b [u8], bool),
    /// Text string; the flag is true when the string was chunked.
    Text(&'b str, bool),
    Array(&'a mut Array<'b>),
    Map(&'a mut Map<'b>),
    False,
    True,
    Null,
    Undefined,
    Simple(u8),
    Float(f64),
}

impl<'a, 'b: 'a> Value<'a, 'b> {
    pub fn type_name(&self, tagged: bool) -> String {
        let name = match self {
            Value::UnsignedInteger(_) => "unsigned integer",
            Value::NegativeInteger(_) => "negative integer",
            Value::Bytes(_, false) => "byte string",
            Value::Bytes(_, true) => "chunked byte string",
            Value::Text(_, false) => "text string",
            Value::Text(_, true) => "chunked text string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::False => "false",
            Value::True => "true",
            Value::Null => "null",
            Value::Undefined => "undefined",
            Value::Simple(_) => "simple value",
            Value::Float(_) => "float",
        };
        if tagged {
            format!("tagged {name}")
        } else {
            name.to_string()
        }
    }

    /// Consume the remainder of a nested array or map; a no-op for scalars.
    pub fn skip(&mut self, mut max_recursion: usize) -> Result<(), Error> {
        match self {
            Value::Array(a) => {
                if max_recursion == 0 {
                    return Err(Error::MaxRecursion);
                }
                max_recursion -= 1;
                a.skip_to_end(max_recursion)
            }
            Value::Map(m) => {
                if max_recursion == 0 {
                    return Err(Error::MaxRecursion);
                }
                max_recursion -= 1;
                m.skip_to_end(max_recursion)
            }
            _ => Ok(()),
        }
    }
}

/// Cursor over the items of an array or the key/value items of a map.
pub struct Sequence<'a, const D: usize> {
    data: &'a [u8],
    count: Option<usize>,
    offset: &'a mut usize,
    idx: usize,
}

pub type Array<'a> = Sequence<'a, 1>;
pub type Map<'a> = Sequence<'a, 2>;

impl<'a, const D: usize> Sequence<'a, D> {
    fn new(data: &'a [u8], count: Option<usize>, offset: &'a mut usize) -> Self {
        Self {
            data,
            count,
            offset,
            idx: 0,
        }
    }

    /// Declared item count, if the sequence is definite-length.
    pub fn count(&self) -> Option<usize> {
        self.count.map(|c| c / D)
    }

    pub fn is_definite(&self) -> bool {
        self.count.is_some()
    }

    /// Byte offset of the cursor within the buffer the sequence was parsed
    /// from.
    pub fn offset(&self) -> usize {
        *self.offset
    }

    fn check_for_end(&mut self) -> Result<bool, Error> {
        if let Some(count) = self.count {
            match self.idx.cmp(&count) {
                std::cmp::Ordering::Greater => Ok(true),
                std::cmp::Ordering::Equal => {
                    self.idx += 1;
                    Ok(true)
                }
                std::cmp::Ordering::Less => Ok(false),
            }
        } else if *self.offset >= self.data.len() {
            Err(Error::NotEnoughData)
        } else if self.data[*self.offset] == 0xFF {
            if self.idx % D == 1 {
                Err(Error::PartialMap)
            } else {
                self.count = Some(self.idx);
                self.idx += 1;
                *self.offset += 1;
                Ok(true)
            }
        } else {
            Ok(false)
        }
    }

    /// Returns the end offset once all items have been read, `None` if items
    /// remain.
    pub fn end(&mut self) -> Result<Option<usize>, Error> {
        if self.check_for_end()? {
            Ok(Some(*self.offset))
        } else {
            Ok(None)
        }
    }

    fn complete(mut self) -> Result<(), Error> {
        if !self.check_for_end()? {
            return Err(Error::MoreItems);
        }
        Ok(())
    }

    pub fn skip_value(&mut self) -> Result<(), Error> {
        self.parse_value(|mut value, _, _| value.skip(MAX_SKIP_DEPTH))
            .map(|_| ())
    }

    pub fn skip_to_end(&mut self, max_recursion: usize) -> Result<(), Error> {
        while self
            .try_parse_value(|mut value, _, _| value.skip(max_recursion))?
            .is_some()
        {
            if D == 2 {
                self.parse_value(|mut value, _, _| value.skip(max_recursion))?;
            }
        }
        Ok(())
    }

    /// Parse the next item via a closure receiving the value, the byte
    /// offset the item starts at, and any preceding tags.
    pub fn try_parse_value<T, F, E>(&mut self, f: F) -> Result<Option<T>, E>
    where
        F: FnOnce(Value, usize, &[u64]) -> Result<T, E>,
        E: From<Error>,
    {
        if self.check_for_end()? {
            Ok(None)
        } else {
            let item_start = *self.offset;
            let r = try_parse_value(&self.data[item_start..], |value, tags| {
                f(value, item_start, tags)
            });
            if let Ok(Some((_, len))) = r {
                self.idx += 1;
                *self.offset += len;
            }
            r.map(|o| o.map(|(v, _)| v))
        }
    }

    #[inline]
    pub fn parse_value<T, F, E>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(Value, usize, &[u64]) -> Result<T, E>,
        E: From<Error>,
    {
        self.try_parse_value(f)?.ok_or(Error::NotEnoughData.into())
    }

    pub fn try_parse<T>(&mut self) -> Result<Option<T>, T::Error>
    where
        T: FromCbor,
        T::Error: From<Error>,
    {
        if self.check_for_end()? {
            Ok(None)
        } else {
            match T::try_from_cbor(&self.data[*self.offset..])? {
                Some((value, len)) => {
                    self.idx += 1;
                    *self.offset += len;
                    Ok(Some(value))
                }
                None => Ok(None),
            }
        }
    }

    pub fn parse<T>(&mut self) -> Result<T, T::Error>
    where
        T: FromCbor,
        T::Error: From<Error>,
    {
        self.try_parse::<T>()?.ok_or(Error::NotEnoughData.into())
    }

    pub fn try_parse_array<T, F, E>(&mut self, f: F) -> Result<Option<T>, E>
    where
        F: FnOnce(&mut Array, usize, &[u64]) -> Result<T, E>,
        E: From<Error>,
    {
        self.try_parse_value(|value, start, tags| match value {
            Value::Array(a) => f(a, start, tags),
            value => Err(Error::IncorrectType("array", value.type_name(!tags.is_empty())).into()),
        })
    }

    pub fn parse_array<T, F, E>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Array, usize, &[u64]) -> Result<T, E>,
        E: From<Error>,
    {
        self.try_parse_array(f)?.ok_or(Error::NotEnoughData.into())
    }

    pub fn try_parse_map<T, F, E>(&mut self, f: F) -> Result<Option<T>, E>
    where
        F: FnOnce(&mut Map, usize, &[u64]) -> Result<T, E>,
        E: From<Error>,
    {
        self.try_parse_value(|value, start, tags| match value {
            Value::Map(m) => f(m, start, tags),
            value => Err(Error::IncorrectType("map", value.type_name(!tags.is_empty())).into()),
        })
    }
}

fn parse_tags(data: &[u8]) -> Result<(Vec<u64>, usize), Error> {
    let mut tags = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        match (data[offset] >> 5, data[offset] & 0x1F) {
            (6, minor) => {
                let (tag, o) = parse_uint_minor(minor, &data[offset + 1..])?;
                tags.push(tag);
                offset += o + 1;
            }
            _ => break,
        }
    }
    Ok((tags, offset))
}

fn to_array<const N: usize>(data: &[u8]) -> Result<[u8; N], Error> {
    if data.len() < N {
        Err(Error::NotEnoughData)
    } else {
        Ok(data[0..N].try_into().unwrap())
    }
}

fn parse_uint_minor(minor: u8, data: &[u8]) -> Result<(u64, usize), Error> {
    match minor {
        24 => {
            if data.is_empty() {
                Err(Error::NotEnoughData)
            } else {
                Ok((data[0] as u64, 1))
            }
        }
        25 => Ok((u16::from_be_bytes(to_array(data)?) as u64, 2)),
        26 => Ok((u32::from_be_bytes(to_array(data)?) as u64, 4)),
        27 => Ok((u64::from_be_bytes(to_array(data)?), 8)),
        val if val < 24 => Ok((val as u64, 0)),
        _ => Err(Error::InvalidMinorValue(minor)),
    }
}

fn parse_data_minor(minor: u8, data: &[u8]) -> Result<(&[u8], usize), Error> {
    let (data_len, len) = parse_uint_minor(minor, data)?;
    let end = (len as u64)
        .checked_add(data_len)
        .ok_or(Error::NotEnoughData)?;
    if end > data.len() as u64 {
        Err(Error::NotEnoughData)
    } else {
        Ok((&data[len..end as usize], end as usize))
    }
}

fn parse_data_chunked(major: u8, data: &[u8]) -> Result<(Vec<&[u8]>, usize), Error> {
    let mut chunks = Vec::new();
    let mut offset = 0;
    loop {
        if offset >= data.len() {
            break Err(Error::NotEnoughData);
        }

        let v = data[offset];
        offset += 1;

        if v == 0xFF {
            break Ok((chunks, offset));
        }

        if v >> 5 != major || v & 0x1F == 31 {
            break Err(Error::InvalidChunk);
        }

        let (chunk, chunk_len) = parse_data_minor(v & 0x1F, &data[offset..])?;
        chunks.push(chunk);
        offset += chunk_len;
    }
}

/// Parse a single item via a closure receiving the value and any preceding
/// tags; returns the closure result plus bytes consumed.
pub fn try_parse_value<T, F, E>(data: &[u8], f: F) -> Result<Option<(T, usize)>, E>
where
    F: FnOnce(Value, &[u64]) -> Result<T, E>,
    E: From<Error>,
{
    let (tags, mut offset) = parse_tags(data)?;
    if offset >= data.len() {
        if !tags.is_empty() {
            return Err(Error::JustTags.into());
        } else {
            return Ok(None);
        }
    }

    match (data[offset] >> 5, data[offset] & 0x1F) {
        (0, minor) => {
            let (v, len) = parse_uint_minor(minor, &data[offset + 1..])?;
            offset += len + 1;
            f(Value::UnsignedInteger(v), &tags)
        }
        (1, minor) => {
            let (v, len) = parse_uint_minor(minor, &data[offset + 1..])?;
            offset += len + 1;
            f(Value::NegativeInteger(v), &tags)
        }
        (2, 31) => {
            let (chunks, len) = parse_data_chunked(2, &data[offset + 1..])?;
            let v = chunks.concat();
            offset += len + 1;
            f(Value::Bytes(&v, true), &tags)
        }
        (2, minor) => {
            let (v, len) = parse_data_minor(minor, &data[offset + 1..])?;
            offset += len + 1;
            f(Value::Bytes(v, false), &tags)
        }
        (3, 31) => {
            let (chunks, len) = parse_data_chunked(3, &data[offset + 1..])?;
            let s = chunks.into_iter().try_fold(String::new(), |mut s, b| {
                s.push_str(std::str::from_utf8(b)?);
                Ok::<_, Error>(s)
            })?;
            offset += len + 1;
            f(Value::Text(&s, true), &tags)
        }
        (3, minor) => {
            let (v, len) = parse_data_minor(minor, &data[offset + 1..])?;
            offset += len + 1;
            f(
                Value::Text(std::str::from_utf8(v).map_err(Error::from)?, false),
                &tags,
            )
        }
        (4, 31) => {
            offset += 1;
            let mut a = Array::new(data, None, &mut offset);
            let r = f(Value::Array(&mut a), &tags)?;
            a.complete().map(|_| r).map_err(Into::into)
        }
        (4, minor) => {
            let (count, len) = parse_uint_minor(minor, &data[offset + 1..])?;
            offset += len + 1;
            if count > usize::MAX as u64 {
                return Err(Error::NotEnoughData.into());
            }
            let mut a = Array::new(data, Some(count as usize), &mut offset);
            let r = f(Value::Array(&mut a), &tags)?;
            a.complete().map(|_| r).map_err(Into::into)
        }
        (5, 31) => {
            offset += 1;
            let mut m = Map::new(data, None, &mut offset);
            let r = f(Value::Map(&mut m), &tags)?;
            m.complete().map(|_| r).map_err(Into::into)
        }
        (5, minor) => {
            let (count, len) = parse_uint_minor(minor, &data[offset + 1..])?;
            offset += len + 1;
            if count > (usize::MAX as u64) / 2 {
                return Err(Error::NotEnoughData.into());
            }
            let mut m = Map::new(data, Some((count * 2) as usize), &mut offset);
            let r = f(Value::Map(&mut m), &tags)?;
            m.complete().map(|_| r).map_err(Into::into)
        }
        (6, _) => unreachable!(),
        (7, 20) => {
            offset += 1;
            f(Value::False, &tags)
        }
        (7, 21) => {
            offset += 1;
            f(Value::True, &tags)
        }
        (7, 22) => {
            offset += 1;
            f(Value::Null, &tags)
        }
        (7, 23) => {
            offset += 1;
            f(Value::Undefined, &tags)
        }
        (7, minor @ 0..=19) => {
            offset += 1;
            f(Value::Simple(minor), &tags)
        }
        (7, 24) => {
            if data.len() <= offset + 1 {
                return Err(Error::NotEnoughData.into());
            }
            let v = data[offset + 1];
            if v < 32 {
                return Err(Error::InvalidSimpleType(v).into());
            }
            offset += 2;
            f(Value::Simple(v), &tags)
        }
        (7, 25) => {
            let v = half::f16::from_be_bytes(to_array(&data[offset + 1..])?);
            offset += 3;
            f(Value::Float(v.into()), &tags)
        }
        (7, 26) => {
            let v = f32::from_be_bytes(to_array(&data[offset + 1..])?);
            offset += 5;
            f(Value::Float(v.into()), &tags)
        }
        (7, 27) => {
            let v = f64::from_be_bytes(to_array(&data[offset + 1..])?);
            offset += 9;
            f(Value::Float(v), &tags)
        }
        (7, minor) => {
            return Err(Error::InvalidMinorValue(minor).into());
        }
        (8.., _) => unreachable!(),
    }
    .map(|r| Some((r, offset)))
}

#[inline]
pub fn parse_value<T, F, E>(data: &[u8], f: F) -> Result<(T, usize), E>
where
    F: FnOnce(Value, &[u64]) -> Result<T, E>,
    E: From<Error>,
{
    try_parse_value(data, f)?.ok_or(Error::NotEnoughData.into())
}

pub fn try_parse_array<T, F, E>(data: &[u8], f: F) -> Result<Option<(T, usize)>, E>
where
    F: FnOnce(&mut Array, &[u64]) -> Result<T, E>,
    E: From<Error>,
{
    try_parse_value(data, |value, tags| match value {
        Value::Array(a) => f(a, tags),
        value => Err(Error::IncorrectType("array", value.type_name(!tags.is_empty())).into()),
    })
}

pub fn parse_array<T, F, E>(data: &[u8], f: F) -> Result<(T, usize), E>
where
    F: FnOnce(&mut Array, &[u64]) -> Result<T, E>,
    E: From<Error>,
{
    try_parse_array(data, f)?.ok_or(Error::NotEnoughData.into())
}

pub fn try_parse_map<T, F, E>(data: &[u8], f: F) -> Result<Option<(T, usize)>, E>
where
    F: FnOnce(&mut Map, &[u64]) -> Result<T, E>,
    E: From<Error>,
{
    try_parse_value(data, |value, tags| match value {
        Value::Map(m) => f(m, tags),
        value => Err(Error::IncorrectType("map", value.type_name(!tags.is_empty())).into()),
    })
}

/// Parse a single `T`, ignoring trailing data.
pub fn try_parse<T>(data: &[u8]) -> Result<Option<T>, T::Error>
where
    T: FromCbor,
    T::Error: From<Error>,
{
    T::try_from_cbor(data).map(|r| r.map(|(v, _)| v))
}

pub fn parse<T>(data: &[u8]) -> Result<T, T::Error>
where
    T: FromCbor,
    T::Error: From<Error>,
{
    try_parse::<T>(data)?.ok_or(Error::NotEnoughData.into())
}

fn expect_untagged<T>(tags: &[u64], expecting: &'static str, v: T) -> Result<T, Error> {
    if tags.is_empty() {
        Ok(v)
    } else {
        Err(Error::IncorrectType(expecting, format!("tagged {expecting}")))
    }
}

impl FromCbor for u64 {
    type Error = Error;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
        try_parse_value(data, |value, tags| match value {
            Value::UnsignedInteger(n) => expect_untagged(tags, "unsigned integer", n),
            value => Err(Error::IncorrectType(
                "unsigned integer",
                value.type_name(!tags.is_empty()),
            )),
        })
    }
}

macro_rules! uint_from_cbor {
    ($($t:ty),*) => {
        $(impl FromCbor for $t {
            type Error = Error;

            fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
                match u64::try_from_cbor(data)? {
                    Some((v, len)) => Ok(Some((v.try_into()?, len))),
                    None => Ok(None),
                }
            }
        })*
    };
}

uint_from_cbor!(u8, u16, u32, usize);

impl FromCbor for i64 {
    type Error = Error;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
        try_parse_value(data, |value, tags| match value {
            Value::UnsignedInteger(n) => {
                expect_untagged(tags, "integer", ())?;
                i64::try_from(n).map_err(Into::into)
            }
            Value::NegativeInteger(n) => {
                expect_untagged(tags, "integer", ())?;
                Ok(-1i64 - i64::try_from(n)?)
            }
            value => Err(Error::IncorrectType(
                "integer",
                value.type_name(!tags.is_empty()),
            )),
        })
    }
}

macro_rules! int_from_cbor {
    ($($t:ty),*) => {
        $(impl FromCbor for $t {
            type Error = Error;

            fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
                match i64::try_from_cbor(data)? {
                    Some((v, len)) => Ok(Some((v.try_into()?, len))),
                    None => Ok(None),
                }
            }
        })*
    };
}

int_from_cbor!(i8, i16, i32, isize);

impl FromCbor for f64 {
    type Error = Error;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
        try_parse_value(data, |value, tags| match value {
            Value::Float(f) => expect_untagged(tags, "float", f),
            value => Err(Error::IncorrectType(
                "float",
                value.type_name(!tags.is_empty()),
            )),
        })
    }
}

impl FromCbor for f32 {
    type Error = Error;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
        match f64::try_from_cbor(data)? {
            Some((v, len)) => {
                let f = v as f32;
                if f64::from(f) == v || v.is_nan() {
                    Ok(Some((f, len)))
                } else {
                    Err(Error::PrecisionLoss)
                }
            }
            None => Ok(None),
        }
    }
}

impl FromCbor for bool {
    type Error = Error;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
        try_parse_value(data, |value, tags| match value {
            Value::False => expect_untagged(tags, "boolean", false),
            Value::True => expect_untagged(tags, "boolean", true),
            value => Err(Error::IncorrectType(
                "boolean",
                value.type_name(!tags.is_empty()),
            )),
        })
    }
}

impl FromCbor for Vec<u8> {
    type Error = Error;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
        try_parse_value(data, |value, tags| match value {
            Value::Bytes(v, _) => expect_untagged(tags, "byte string", v.to_vec()),
            value => Err(Error::IncorrectType(
                "byte string",
                value.type_name(!tags.is_empty()),
            )),
        })
    }
}

impl FromCbor for Box<[u8]> {
    type Error = Error;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
        Ok(Vec::<u8>::try_from_cbor(data)?.map(|(v, len)| (v.into_boxed_slice(), len)))
    }
}

impl FromCbor for String {
    type Error = Error;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
        try_parse_value(data, |value, tags| match value {
            Value::Text(v, _) => expect_untagged(tags, "text string", v.to_string()),
            value => Err(Error::IncorrectType(
                "text string",
                value.type_name(!tags.is_empty()),
            )),
        })
    }
}

impl<T> FromCbor for Option<T>
where
    T: FromCbor,
    T::Error: From<Error>,
{
    type Error = T::Error;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
        match try_parse_value(data, |value, tags| match value {
            Value::Undefined => expect_untagged(tags, "undefined", true),
            _ => Ok(false),
        })? {
            Some((true, len)) => Ok(Some((None, len))),
            Some((false, _)) => match T::try_from_cbor(data)? {
                Some((v, len)) => Ok(Some((Some(v), len))),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }
}
