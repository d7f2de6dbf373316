//! Minimal wire (de)serialization for broadcast message payloads (§6: "all
//! integers little-endian on the wire, packed without padding").
//!
//! Built directly on top of `byteorder` rather than pulling in a
//! dedicated serialization crate, since the wire shape here is small and
//! fixed.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

pub trait Serial {
    fn serial<W: Write>(&self, target: &mut W) -> io::Result<()>;
}

pub trait Deserial: Sized {
    fn deserial<R: Read>(source: &mut R) -> io::Result<Self>;
}

impl Serial for u32 {
    fn serial<W: Write>(&self, target: &mut W) -> io::Result<()> { target.write_u32::<LittleEndian>(*self) }
}

impl Deserial for u32 {
    fn deserial<R: Read>(source: &mut R) -> io::Result<Self> { source.read_u32::<LittleEndian>() }
}

impl Serial for u64 {
    fn serial<W: Write>(&self, target: &mut W) -> io::Result<()> { target.write_u64::<LittleEndian>(*self) }
}

impl Deserial for u64 {
    fn deserial<R: Read>(source: &mut R) -> io::Result<Self> { source.read_u64::<LittleEndian>() }
}

impl Serial for crate::common::Pnn {
    fn serial<W: Write>(&self, target: &mut W) -> io::Result<()> { self.0.serial(target) }
}

impl Deserial for crate::common::Pnn {
    fn deserial<R: Read>(source: &mut R) -> io::Result<Self> { Ok(crate::common::Pnn(u32::deserial(source)?)) }
}
