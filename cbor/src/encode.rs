/*!
A deterministic CBOR encoder.

Only definite-length items are produced, integers use the shortest form, and
floats are emitted as the smallest of f16/f32/f64 that round-trips the value.
Maps are written in canonical order: entries sorted by serialized key length,
then by lexicographic key bytes.
*/

/// A type that can be written to an [`Encoder`].
pub trait ToCbor {
    fn to_cbor(&self, encoder: &mut Encoder);
}

#[derive(Default)]
pub struct Encoder {
    data: Vec<u8>,
}

impl Encoder {
    /// Number of bytes written so far.
    pub fn offset(&self) -> usize {
        self.data.len()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    fn emit_uint_minor(&mut self, major: u8, val: u64) {
        if val < 24 {
            self.data.push((major << 5) | (val as u8));
        } else if val <= u8::MAX as u64 {
            self.data.push((major << 5) | 24);
            self.data.push(val as u8);
        } else if val <= u16::MAX as u64 {
            self.data.push((major << 5) | 25);
            self.data.extend((val as u16).to_be_bytes());
        } else if val <= u32::MAX as u64 {
            self.data.push((major << 5) | 26);
            self.data.extend((val as u32).to_be_bytes());
        } else {
            self.data.push((major << 5) | 27);
            self.data.extend(val.to_be_bytes());
        }
    }

    fn emit_tags<I>(&mut self, tags: I)
    where
        I: IntoIterator<Item = u64>,
    {
        for tag in tags {
            self.emit_uint_minor(6, tag);
        }
    }

    /// Append pre-encoded CBOR verbatim.
    pub fn emit_raw(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    pub fn emit<T>(&mut self, value: &T)
    where
        T: ToCbor + ?Sized,
    {
        value.to_cbor(self)
    }

    pub fn emit_tagged<T, I>(&mut self, value: &T, tags: I)
    where
        T: ToCbor + ?Sized,
        I: IntoIterator<Item = u64>,
    {
        self.emit_tags(tags);
        self.emit(value)
    }

    pub fn emit_array<F>(&mut self, count: usize, f: F)
    where
        F: FnOnce(&mut Array),
    {
        let mut a = Array::new(self, count);
        f(&mut a);
        a.end()
    }

    pub fn emit_map<F>(&mut self, count: usize, f: F)
    where
        F: FnOnce(&mut Map),
    {
        let mut m = Map::new(self, count);
        f(&mut m);
        m.end()
    }
}

/// Writer for the items of a definite-length array.
///
/// Panics on [`end`](Encoder::emit_array) if the number of items emitted does
/// not match the declared count.
pub struct Array<'a> {
    encoder: &'a mut Encoder,
    count: usize,
    idx: usize,
}

impl<'a> Array<'a> {
    fn new(encoder: &'a mut Encoder, count: usize) -> Self {
        encoder.emit_uint_minor(4, count as u64);
        Self {
            encoder,
            count,
            idx: 0,
        }
    }

    fn check_bounds(&mut self) {
        self.idx += 1;
        if self.idx > self.count {
            panic!("too many items added to definite-length array");
        }
    }

    fn end(self) {
        if self.idx != self.count {
            panic!(
                "definite-length array is short of items: {} of {}",
                self.idx, self.count
            );
        }
    }

    /// Number of bytes written to the underlying encoder.
    pub fn offset(&self) -> usize {
        self.encoder.offset()
    }

    /// Account for an item that will be appended out-of-band (e.g. a CRC
    /// byte string patched in after encoding).
    pub fn skip_value(&mut self) {
        self.check_bounds()
    }

    pub fn emit_raw(&mut self, data: &[u8]) {
        self.check_bounds();
        self.encoder.emit_raw(data)
    }

    pub fn emit<T>(&mut self, value: &T)
    where
        T: ToCbor + ?Sized,
    {
        self.check_bounds();
        self.encoder.emit(value)
    }

    pub fn emit_tagged<T, I>(&mut self, value: &T, tags: I)
    where
        T: ToCbor + ?Sized,
        I: IntoIterator<Item = u64>,
    {
        self.check_bounds();
        self.encoder.emit_tagged(value, tags)
    }

    pub fn emit_array<F>(&mut self, count: usize, f: F)
    where
        F: FnOnce(&mut Array),
    {
        self.check_bounds();
        self.encoder.emit_array(count, f)
    }

    pub fn emit_map<F>(&mut self, count: usize, f: F)
    where
        F: FnOnce(&mut Map),
    {
        self.check_bounds();
        self.encoder.emit_map(count, f)
    }
}

/// Writer for the entries of a definite-length map.
///
/// Entries are buffered and written in canonical order when the map is
/// closed, regardless of emission order.
pub struct Map<'a> {
    encoder: &'a mut Encoder,
    count: usize,
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    pending_key: Option<Vec<u8>>,
}

impl<'a> Map<'a> {
    fn new(encoder: &'a mut Encoder, count: usize) -> Self {
        Self {
            encoder,
            count,
            entries: Vec::with_capacity(count),
            pending_key: None,
        }
    }

    fn push_item(&mut self, item: Vec<u8>) {
        match self.pending_key.take() {
            None => self.pending_key = Some(item),
            Some(key) => {
                if self.entries.len() == self.count {
                    panic!("too many entries added to definite-length map");
                }
                self.entries.push((key, item));
            }
        }
    }

    /// Emit the next key or value; keys and values alternate.
    pub fn emit<T>(&mut self, value: &T)
    where
        T: ToCbor + ?Sized,
    {
        let mut e = Encoder::default();
        e.emit(value);
        self.push_item(e.data);
    }

    pub fn emit_array<F>(&mut self, count: usize, f: F)
    where
        F: FnOnce(&mut Array),
    {
        let mut e = Encoder::default();
        e.emit_array(count, f);
        self.push_item(e.data);
    }

    pub fn emit_map<F>(&mut self, count: usize, f: F)
    where
        F: FnOnce(&mut Map),
    {
        let mut e = Encoder::default();
        e.emit_map(count, f);
        self.push_item(e.data);
    }

    fn end(mut self) {
        if self.pending_key.is_some() {
            panic!("map has a key with no value");
        }
        if self.entries.len() != self.count {
            panic!(
                "definite-length map is short of entries: {} of {}",
                self.entries.len(),
                self.count
            );
        }
        self.entries
            .sort_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        self.encoder.emit_uint_minor(5, self.count as u64);
        for (key, value) in self.entries {
            self.encoder.data.extend(key);
            self.encoder.data.extend(value);
        }
    }
}

impl ToCbor for u64 {
    fn to_cbor(&self, encoder: &mut Encoder) {
        encoder.emit_uint_minor(0, *self)
    }
}

impl ToCbor for usize {
    fn to_cbor(&self, encoder: &mut Encoder) {
        encoder.emit_uint_minor(0, *self as u64)
    }
}

impl ToCbor for u32 {
    fn to_cbor(&self, encoder: &mut Encoder) {
        encoder.emit_uint_minor(0, *self as u64)
    }
}

impl ToCbor for u16 {
    fn to_cbor(&self, encoder: &mut Encoder) {
        encoder.emit_uint_minor(0, *self as u64)
    }
}

impl ToCbor for u8 {
    fn to_cbor(&self, encoder: &mut Encoder) {
        encoder.emit_uint_minor(0, *self as u64)
    }
}

fn emit_i64(encoder: &mut Encoder, val: i64) {
    if val >= 0 {
        encoder.emit_uint_minor(0, val as u64)
    } else {
        encoder.emit_uint_minor(1, !(val as u64))
    }
}

impl ToCbor for i64 {
    fn to_cbor(&self, encoder: &mut Encoder) {
        emit_i64(encoder, *self)
    }
}

impl ToCbor for isize {
    fn to_cbor(&self, encoder: &mut Encoder) {
        emit_i64(encoder, *self as i64)
    }
}

impl ToCbor for i32 {
    fn to_cbor(&self, encoder: &mut Encoder) {
        emit_i64(encoder, *self as i64)
    }
}

impl ToCbor for i16 {
    fn to_cbor(&self, encoder: &mut Encoder) {
        emit_i64(encoder, *self as i64)
    }
}

impl ToCbor for i8 {
    fn to_cbor(&self, encoder: &mut Encoder) {
        emit_i64(encoder, *self as i64)
    }
}

impl ToCbor for half::f16 {
    fn to_cbor(&self, encoder: &mut Encoder) {
        encoder.data.push((7 << 5) | 25);
        encoder.data.extend(self.to_be_bytes());
    }
}

impl ToCbor for f32 {
    fn to_cbor(&self, encoder: &mut Encoder) {
        let f = half::f16::from_f32(*self);
        if f32::from(f) == *self {
            encoder.emit(&f)
        } else {
            encoder.data.push((7 << 5) | 26);
            encoder.data.extend(self.to_be_bytes());
        }
    }
}

impl ToCbor for f64 {
    fn to_cbor(&self, encoder: &mut Encoder) {
        let f = *self as f32;
        if f64::from(f) == *self {
            encoder.emit(&f)
        } else {
            encoder.data.push((7 << 5) | 27);
            encoder.data.extend(self.to_be_bytes());
        }
    }
}

impl ToCbor for bool {
    fn to_cbor(&self, encoder: &mut Encoder) {
        encoder.data.push((7 << 5) | if *self { 21 } else { 20 });
    }
}

impl ToCbor for str {
    fn to_cbor(&self, encoder: &mut Encoder) {
        encoder.emit_uint_minor(3, self.len() as u64);
        encoder.data.extend(self.as_bytes());
    }
}

impl ToCbor for String {
    fn to_cbor(&self, encoder: &mut Encoder) {
        self.as_str().to_cbor(encoder)
    }
}

impl ToCbor for [u8] {
    fn to_cbor(&self, encoder: &mut Encoder) {
        encoder.emit_uint_minor(2, self.len() as u64);
        encoder.data.extend(self);
    }
}

impl ToCbor for Vec<u8> {
    fn to_cbor(&self, encoder: &mut Encoder) {
        self.as_slice().to_cbor(encoder)
    }
}

impl ToCbor for Box<[u8]> {
    fn to_cbor(&self, encoder: &mut Encoder) {
        self.as_ref().to_cbor(encoder)
    }
}

impl<const N: usize> ToCbor for [u8; N] {
    fn to_cbor(&self, encoder: &mut Encoder) {
        self.as_slice().to_cbor(encoder)
    }
}

impl<T> ToCbor for Option<T>
where
    T: ToCbor,
{
    fn to_cbor(&self, encoder: &mut Encoder) {
        match self {
            Some(value) => encoder.emit(value),
            None => encoder.data.push((7 << 5) | 23),
        }
    }
}

impl<T> ToCbor for &T
where
    T: ToCbor + ?Sized,
{
    fn to_cbor(&self, encoder: &mut Encoder) {
        (*self).to_cbor(encoder)
    }
}

impl<A, B> ToCbor for (A, B)
where
    A: ToCbor,
    B: ToCbor,
{
    fn to_cbor(&self, encoder: &mut Encoder) {
        encoder.emit_array(2, |a| {
            a.emit(&self.0);
            a.emit(&self.1);
        })
    }
}

/// Encode a single value.
pub fn emit<T>(value: &T) -> Vec<u8>
where
    T: ToCbor + ?Sized,
{
    let mut e = Encoder::default();
    e.emit(value);
    e.data
}

/// Encode a single tagged value.
pub fn emit_tagged<T, I>(value: &T, tags: I) -> Vec<u8>
where
    T: ToCbor + ?Sized,
    I: IntoIterator<Item = u64>,
{
    let mut e = Encoder::default();
    e.emit_tagged(value, tags);
    e.data
}

/// Encode an unassigned simple value.
///
/// Panics for values with dedicated encodings (booleans, null, undefined) or
/// reserved codepoints; use the typed emitters for those.
pub fn emit_simple_value(value: u8) -> Vec<u8> {
    match value {
        20 | 21 | 22 | 23 | 24..=31 => panic!("simple value {value} has a dedicated encoding"),
        _ => {
            let mut e = Encoder::default();
            e.emit_uint_minor(7, value as u64);
            e.data
        }
    }
}

/// Encode a definite-length array via a closure.
pub fn emit_array<F>(count: usize, f: F) -> Vec<u8>
where
    F: FnOnce(&mut Array),
{
    let mut e = Encoder::default();
    e.emit_array(count, f);
    e.data
}

/// Encode a definite-length map via a closure.
pub fn emit_map<F>(count: usize, f: F) -> Vec<u8>
where
    F: FnOnce(&mut Map),
{
    let mut e = Encoder::default();
    e.emit_map(count, f);
    e.data
}
