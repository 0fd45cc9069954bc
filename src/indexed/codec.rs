//! Binary encoding of directory trees.
//!
//! All integers are little-endian. A directory is a `u32` entry count
//! followed by, for each entry, its name, a kind byte (0 = directory,
//! 1 = data) and the nested directory or the value. Values are a type byte
//! (see [`ValueType`]) followed by the payload.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::tree::{Directory, Entry};
use crate::core::{PathMatcher, Value, ValueType};
use crate::util::{BBox3d, DMat4, DVec3, Error, Name, Result};

const KIND_DIR: u8 = 0;
const KIND_DATA: u8 = 1;

/// Deepest directory or compound nesting accepted when decoding.
const MAX_DEPTH: usize = 4096;

/// Encode a whole tree.
pub fn encode_tree(root: &Directory) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_dir(&mut out, root)?;
    Ok(out)
}

/// Decode a tree produced by [`encode_tree`]. Trailing bytes are an error.
pub fn decode_tree(data: &[u8]) -> Result<Directory> {
    let mut cur = Cursor::new(data);
    let dir = read_dir(&mut cur, 0)?;
    if cur.position() as usize != data.len() {
        return Err(Error::corrupted(format!(
            "{} trailing bytes after tree",
            data.len() - cur.position() as usize
        )));
    }
    Ok(dir)
}

fn write_len(out: &mut Vec<u8>, len: usize) -> Result<()> {
    let len = u32::try_from(len).map_err(|_| Error::invalid_arg("entry too large to encode"))?;
    out.write_u32::<LittleEndian>(len)?;
    Ok(())
}

fn write_str(out: &mut Vec<u8>, s: &str) -> Result<()> {
    write_len(out, s.len())?;
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn write_f64s(out: &mut Vec<u8>, values: &[f64]) -> Result<()> {
    for v in values {
        out.write_f64::<LittleEndian>(*v)?;
    }
    Ok(())
}

fn write_dir(out: &mut Vec<u8>, dir: &Directory) -> Result<()> {
    write_len(out, dir.len())?;
    for (name, entry) in dir.iter() {
        write_str(out, name)?;
        match entry {
            Entry::Dir(d) => {
                out.write_u8(KIND_DIR)?;
                write_dir(out, d)?;
            }
            Entry::Data(v) => {
                out.write_u8(KIND_DATA)?;
                write_value(out, v)?;
            }
        }
    }
    Ok(())
}

fn write_value(out: &mut Vec<u8>, value: &Value) -> Result<()> {
    out.write_u8(value.value_type() as u8)?;
    match value {
        Value::Bool(v) => out.write_u8(*v as u8)?,
        Value::Int(v) => out.write_i64::<LittleEndian>(*v)?,
        Value::Double(v) => out.write_f64::<LittleEndian>(*v)?,
        Value::String(v) => write_str(out, v)?,
        Value::Names(v) => {
            write_len(out, v.len())?;
            for n in v {
                write_str(out, n)?;
            }
        }
        Value::Doubles(v) => {
            write_len(out, v.len())?;
            write_f64s(out, v)?;
        }
        Value::Vector(v) => write_f64s(out, &v.to_array())?,
        Value::Box(b) => {
            write_f64s(out, &b.min.to_array())?;
            write_f64s(out, &b.max.to_array())?;
        }
        Value::Matrix(m) => write_f64s(out, &m.to_cols_array())?,
        Value::Compound(map) => {
            write_len(out, map.len())?;
            for (k, v) in map {
                write_str(out, k)?;
                write_value(out, v)?;
            }
        }
        Value::PathSet(set) => {
            let paths = set.paths();
            write_len(out, paths.len())?;
            for p in &paths {
                write_len(out, p.len())?;
                for seg in p {
                    write_str(out, seg)?;
                }
            }
        }
    }
    Ok(())
}

type Reader<'a> = Cursor<&'a [u8]>;

fn eof(e: std::io::Error) -> Error {
    Error::corrupted(format!("truncated tree: {e}"))
}

fn read_len(cur: &mut Reader<'_>) -> Result<usize> {
    let len = cur.read_u32::<LittleEndian>().map_err(eof)? as usize;
    let remaining = cur.get_ref().len() - cur.position() as usize;
    // Every counted item takes at least one byte
    if len > remaining {
        return Err(Error::corrupted(format!(
            "count {len} exceeds remaining {remaining} bytes"
        )));
    }
    Ok(len)
}

fn read_string(cur: &mut Reader<'_>) -> Result<String> {
    let len = read_len(cur)?;
    let mut buf = vec![0u8; len];
    cur.read_exact(&mut buf).map_err(eof)?;
    String::from_utf8(buf).map_err(|_| Error::corrupted("name is not UTF-8"))
}

fn read_name(cur: &mut Reader<'_>) -> Result<Name> {
    Ok(Name::from(read_string(cur)?))
}

fn read_f64(cur: &mut Reader<'_>) -> Result<f64> {
    cur.read_f64::<LittleEndian>().map_err(eof)
}

fn read_f64_array<const N: usize>(cur: &mut Reader<'_>) -> Result<[f64; N]> {
    let mut out = [0.0; N];
    for v in &mut out {
        *v = read_f64(cur)?;
    }
    Ok(out)
}

fn read_dir(cur: &mut Reader<'_>, depth: usize) -> Result<Directory> {
    if depth > MAX_DEPTH {
        return Err(Error::corrupted("directory nesting too deep"));
    }
    let count = read_len(cur)?;
    let mut dir = Directory::new();
    for _ in 0..count {
        let name = read_name(cur)?;
        let entry = match cur.read_u8().map_err(eof)? {
            KIND_DIR => Entry::Dir(read_dir(cur, depth + 1)?),
            KIND_DATA => Entry::Data(read_value(cur, depth + 1)?),
            k => return Err(Error::corrupted(format!("unknown entry kind {k}"))),
        };
        dir.insert(name, entry);
    }
    Ok(dir)
}

fn read_value(cur: &mut Reader<'_>, depth: usize) -> Result<Value> {
    if depth > MAX_DEPTH {
        return Err(Error::corrupted("value nesting too deep"));
    }
    let tag = cur.read_u8().map_err(eof)?;
    let Some(ty) = ValueType::from_u8(tag) else {
        return Err(Error::corrupted(format!("unknown value type {tag}")));
    };
    Ok(match ty {
        ValueType::Bool => Value::Bool(cur.read_u8().map_err(eof)? != 0),
        ValueType::Int => Value::Int(cur.read_i64::<LittleEndian>().map_err(eof)?),
        ValueType::Double => Value::Double(read_f64(cur)?),
        ValueType::String => Value::String(read_string(cur)?),
        ValueType::Names => {
            let n = read_len(cur)?;
            let mut names = Vec::with_capacity(n);
            for _ in 0..n {
                names.push(read_name(cur)?);
            }
            Value::Names(names)
        }
        ValueType::Doubles => {
            let n = read_len(cur)?;
            let mut v = Vec::with_capacity(n);
            for _ in 0..n {
                v.push(read_f64(cur)?);
            }
            Value::Doubles(v)
        }
        ValueType::Vector => Value::Vector(DVec3::from_array(read_f64_array::<3>(cur)?)),
        ValueType::Box => {
            let min = DVec3::from_array(read_f64_array::<3>(cur)?);
            let max = DVec3::from_array(read_f64_array::<3>(cur)?);
            Value::Box(BBox3d::new(min, max))
        }
        ValueType::Matrix => Value::Matrix(DMat4::from_cols_array(&read_f64_array::<16>(cur)?)),
        ValueType::Compound => {
            let n = read_len(cur)?;
            let mut map = BTreeMap::new();
            for _ in 0..n {
                let key = read_name(cur)?;
                map.insert(key, read_value(cur, depth + 1)?);
            }
            Value::Compound(map)
        }
        ValueType::PathSet => {
            let n = read_len(cur)?;
            let mut set = PathMatcher::new();
            for _ in 0..n {
                let segs = read_len(cur)?;
                let mut path = Vec::with_capacity(segs);
                for _ in 0..segs {
                    path.push(read_name(cur)?);
                }
                set.add_path(&path);
            }
            Value::PathSet(set)
        }
    })
}
