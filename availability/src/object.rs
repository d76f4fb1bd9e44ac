use bytes::{Buf, BufMut, Bytes};
use commonware_codec::{Encode, EncodeSize, Error, Read, ReadExt, Write};
use std::fmt;

/// Version of the [ObjectRef] encoding.
///
/// Bump when the layout changes so stale members can be detected instead of misread.
const VERSION: u8 = 1;

/// Tag byte used to identify [Kind::Book].
const BOOK_TAG: u8 = 0;

/// The kind of object a reference points to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Kind {
    /// A paginated book.
    Book,
}

impl Kind {
    fn tag(&self) -> u8 {
        match self {
            Kind::Book => BOOK_TAG,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            BOOK_TAG => Some(Kind::Book),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Book => write!(f, "book"),
        }
    }
}

/// A typed reference to an object (e.g. `book/1234`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectRef {
    pub kind: Kind,
    pub id: u64,
}

impl ObjectRef {
    /// Create a new reference to an object of the given `kind`.
    pub fn new(kind: Kind, id: u64) -> Self {
        Self { kind, id }
    }

    /// Shorthand for a reference to a [Kind::Book].
    pub fn book(id: u64) -> Self {
        Self::new(Kind::Book, id)
    }

    /// Encode the reference as a store member.
    pub(crate) fn member(&self) -> Bytes {
        self.encode().freeze()
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

impl Write for ObjectRef {
    fn write(&self, buf: &mut impl BufMut) {
        VERSION.write(buf);
        self.kind.tag().write(buf);
        self.id.write(buf);
    }
}

impl EncodeSize for ObjectRef {
    fn encode_size(&self) -> usize {
        1 + 1 + 8
    }
}

impl Read for ObjectRef {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, Error> {
        let version = u8::read(buf)?;
        if version != VERSION {
            return Err(Error::Invalid("availability::ObjectRef", "unsupported version"));
        }
        let kind = Kind::from_tag(u8::read(buf)?)
            .ok_or(Error::Invalid("availability::ObjectRef", "unknown kind"))?;
        let id = u64::read(buf)?;
        Ok(Self { kind, id })
    }
}
