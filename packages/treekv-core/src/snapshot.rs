//! Binary snapshot codec.
//!
//! Layout: `KPH1` magic, u32 little-endian format version, the tree in
//! pre-order with LEB128 varints and children in insertion order, then the
//! keep-while table with a fixed tag per condition variant. The encoding is
//! hand-written so the bytes are stable across releases and independent of
//! any serializer's internals; encode-restore-encode must be bit-identical.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::ids::NodeId;
use crate::keep_while::KeepWhileTable;
use crate::machine::TreeKv;
use crate::path::Path;
use crate::pattern::{CmpOp, Condition, NameMatch, PayloadMatch, VersionCmp};
use crate::tree::Node;

pub const MAGIC: &[u8; 4] = b"KPH1";
pub const VERSION: u32 = 1;

const PAYLOAD_NONE: u8 = 0;
const PAYLOAD_DATA: u8 = 1;
const ID_ATOM: u8 = 0;
const ID_BINARY: u8 = 1;

// Condition tags are wire format, ordered per the predicate catalogue:
// literal id, name, path, data, then the three counters, the combinators,
// and existence. They never follow the enum's declaration order.
const COND_NAME_IS: u8 = 0;
const COND_NAME_MATCHES: u8 = 1;
const COND_PATH_MATCHES: u8 = 2;
const COND_DATA_MATCHES: u8 = 3;
const COND_CHILD_LIST_COUNT: u8 = 4;
const COND_CHILD_LIST_VERSION: u8 = 5;
const COND_PAYLOAD_VERSION: u8 = 6;
const COND_ALL: u8 = 7;
const COND_ANY_OF: u8 = 8;
const COND_NODE_EXISTS: u8 = 9;

const MATCH_ANY: u8 = 0;
const MATCH_SOME: u8 = 1;

pub(crate) fn encode(machine: &TreeKv) -> Vec<u8> {
    let (root, keep_while) = machine.parts();
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    write_node(&mut out, root);
    write_keep_while(&mut out, keep_while);
    out
}

pub(crate) fn decode(bytes: &[u8]) -> Result<TreeKv> {
    let mut reader = Reader::new(bytes);
    let magic = reader.take(MAGIC.len(), "magic")?;
    if magic != MAGIC {
        return Err(Error::CorruptSnapshot("bad magic".to_owned()));
    }
    let version = reader.u32_le("version")?;
    if version != VERSION {
        return Err(Error::UnsupportedVersion(version));
    }
    let root = read_node(&mut reader)?;
    let keep_while = read_keep_while(&mut reader)?;
    if !reader.is_empty() {
        return Err(Error::CorruptSnapshot("trailing bytes".to_owned()));
    }
    Ok(TreeKv::from_parts(root, keep_while))
}

fn write_node(out: &mut Vec<u8>, node: &Node) {
    match node.payload() {
        None => out.push(PAYLOAD_NONE),
        Some(data) => {
            out.push(PAYLOAD_DATA);
            write_bytes(out, data);
        }
    }
    write_uvarint(out, node.payload_version());
    write_uvarint(out, node.child_list_version());
    write_uvarint(out, node.child_count());
    for (id, child) in node.children() {
        write_id(out, id);
        write_node(out, child);
    }
}

fn read_node(reader: &mut Reader<'_>) -> Result<Node> {
    let payload = match reader.u8("payload tag")? {
        PAYLOAD_NONE => None,
        PAYLOAD_DATA => Some(read_bytes(reader, "payload")?),
        tag => {
            return Err(Error::CorruptSnapshot(format!("unknown payload tag {tag}")));
        }
    };
    let payload_version = reader.uvarint("payload_version")?;
    let child_list_version = reader.uvarint("child_list_version")?;
    let child_count = reader.uvarint("child_list_count")?;
    let mut children = Vec::new();
    for _ in 0..child_count {
        let id = read_id(reader)?;
        let child = read_node(reader)?;
        children.push((id, child));
    }
    Ok(Node::from_snapshot_parts(
        payload,
        payload_version,
        child_list_version,
        children,
    ))
}

fn write_keep_while(out: &mut Vec<u8>, table: &KeepWhileTable) {
    out.extend_from_slice(&(table.len() as u32).to_le_bytes());
    for (watcher, conditions) in table.iter() {
        write_path(out, watcher);
        write_uvarint(out, conditions.len() as u64);
        for (watched, condition) in conditions {
            write_path(out, watched);
            write_condition(out, condition);
        }
    }
}

fn read_keep_while(reader: &mut Reader<'_>) -> Result<KeepWhileTable> {
    let count = reader.u32_le("keep-while count")?;
    let mut table = KeepWhileTable::new();
    for _ in 0..count {
        let watcher = read_path(reader)?;
        let entries = reader.uvarint("keep-while entry count")?;
        let mut conditions = BTreeMap::new();
        for _ in 0..entries {
            let watched = read_path(reader)?;
            let condition = read_condition(reader)?;
            conditions.insert(watched, condition);
        }
        table.insert(watcher, conditions);
    }
    Ok(table)
}

fn write_id(out: &mut Vec<u8>, id: &NodeId) {
    match id {
        NodeId::Atom(name) => {
            out.push(ID_ATOM);
            write_bytes(out, name.as_bytes());
        }
        NodeId::Binary(bytes) => {
            out.push(ID_BINARY);
            write_bytes(out, bytes);
        }
    }
}

fn read_id(reader: &mut Reader<'_>) -> Result<NodeId> {
    match reader.u8("id tag")? {
        ID_ATOM => {
            let bytes = read_bytes(reader, "atom id")?;
            let name = String::from_utf8(bytes)
                .map_err(|_| Error::CorruptSnapshot("atom id is not UTF-8".to_owned()))?;
            Ok(NodeId::Atom(name))
        }
        ID_BINARY => Ok(NodeId::Binary(read_bytes(reader, "binary id")?)),
        tag => Err(Error::CorruptSnapshot(format!("unknown id tag {tag}"))),
    }
}

fn write_path(out: &mut Vec<u8>, path: &Path) {
    write_uvarint(out, path.len() as u64);
    for id in path.components() {
        write_id(out, id);
    }
}

fn read_path(reader: &mut Reader<'_>) -> Result<Path> {
    let len = reader.uvarint("path length")?;
    let mut ids = Vec::new();
    for _ in 0..len {
        ids.push(read_id(reader)?);
    }
    Ok(Path::new(ids))
}

fn write_condition(out: &mut Vec<u8>, condition: &Condition) {
    match condition {
        Condition::NameIs(id) => {
            out.push(COND_NAME_IS);
            write_id(out, id);
        }
        Condition::NameMatches(name_match) => {
            out.push(COND_NAME_MATCHES);
            write_name_match(out, name_match);
        }
        Condition::DataMatches(payload_match) => {
            out.push(COND_DATA_MATCHES);
            match payload_match {
                PayloadMatch::Any => out.push(MATCH_ANY),
                PayloadMatch::Exact(bytes) => {
                    out.push(MATCH_SOME);
                    write_bytes(out, bytes);
                }
            }
        }
        Condition::ChildListCount(cmp) => {
            out.push(COND_CHILD_LIST_COUNT);
            write_version_cmp(out, cmp);
        }
        Condition::ChildListVersion(cmp) => {
            out.push(COND_CHILD_LIST_VERSION);
            write_version_cmp(out, cmp);
        }
        Condition::PayloadVersion(cmp) => {
            out.push(COND_PAYLOAD_VERSION);
            write_version_cmp(out, cmp);
        }
        Condition::PathMatches(name_match) => {
            out.push(COND_PATH_MATCHES);
            write_name_match(out, name_match);
        }
        Condition::All(conditions) => {
            out.push(COND_ALL);
            write_uvarint(out, conditions.len() as u64);
            for condition in conditions {
                write_condition(out, condition);
            }
        }
        Condition::AnyOf(conditions) => {
            out.push(COND_ANY_OF);
            write_uvarint(out, conditions.len() as u64);
            for condition in conditions {
                write_condition(out, condition);
            }
        }
        Condition::NodeExists(exists) => {
            out.push(COND_NODE_EXISTS);
            out.push(u8::from(*exists));
        }
    }
}

fn read_condition(reader: &mut Reader<'_>) -> Result<Condition> {
    match reader.u8("condition tag")? {
        COND_NAME_IS => Ok(Condition::NameIs(read_id(reader)?)),
        COND_NAME_MATCHES => Ok(Condition::NameMatches(read_name_match(reader)?)),
        COND_DATA_MATCHES => match reader.u8("data match tag")? {
            MATCH_ANY => Ok(Condition::DataMatches(PayloadMatch::Any)),
            MATCH_SOME => Ok(Condition::DataMatches(PayloadMatch::Exact(read_bytes(
                reader,
                "data match bytes",
            )?))),
            tag => Err(Error::CorruptSnapshot(format!("unknown data match tag {tag}"))),
        },
        COND_CHILD_LIST_COUNT => Ok(Condition::ChildListCount(read_version_cmp(reader)?)),
        COND_CHILD_LIST_VERSION => Ok(Condition::ChildListVersion(read_version_cmp(reader)?)),
        COND_PAYLOAD_VERSION => Ok(Condition::PayloadVersion(read_version_cmp(reader)?)),
        COND_PATH_MATCHES => Ok(Condition::PathMatches(read_name_match(reader)?)),
        COND_ALL => {
            let count = reader.uvarint("condition count")?;
            let mut conditions = Vec::new();
            for _ in 0..count {
                conditions.push(read_condition(reader)?);
            }
            Ok(Condition::All(conditions))
        }
        COND_ANY_OF => {
            let count = reader.uvarint("condition count")?;
            let mut conditions = Vec::new();
            for _ in 0..count {
                conditions.push(read_condition(reader)?);
            }
            Ok(Condition::AnyOf(conditions))
        }
        COND_NODE_EXISTS => match reader.u8("node exists flag")? {
            0 => Ok(Condition::NodeExists(false)),
            1 => Ok(Condition::NodeExists(true)),
            flag => Err(Error::CorruptSnapshot(format!("bad bool byte {flag}"))),
        },
        tag => Err(Error::CorruptSnapshot(format!("unknown condition tag {tag}"))),
    }
}

fn write_name_match(out: &mut Vec<u8>, name_match: &NameMatch) {
    match name_match {
        NameMatch::Any => out.push(MATCH_ANY),
        NameMatch::Regex(source) => {
            out.push(MATCH_SOME);
            write_bytes(out, source.as_bytes());
        }
    }
}

fn read_name_match(reader: &mut Reader<'_>) -> Result<NameMatch> {
    match reader.u8("name match tag")? {
        MATCH_ANY => Ok(NameMatch::Any),
        MATCH_SOME => {
            let bytes = read_bytes(reader, "regex source")?;
            let source = String::from_utf8(bytes)
                .map_err(|_| Error::CorruptSnapshot("regex source is not UTF-8".to_owned()))?;
            Ok(NameMatch::Regex(source))
        }
        tag => Err(Error::CorruptSnapshot(format!("unknown name match tag {tag}"))),
    }
}

fn write_version_cmp(out: &mut Vec<u8>, cmp: &VersionCmp) {
    let op = match cmp.op {
        CmpOp::Eq => 0u8,
        CmpOp::Ne => 1,
        CmpOp::Lt => 2,
        CmpOp::Le => 3,
        CmpOp::Gt => 4,
        CmpOp::Ge => 5,
    };
    out.push(op);
    write_uvarint(out, cmp.value);
}

fn read_version_cmp(reader: &mut Reader<'_>) -> Result<VersionCmp> {
    let op = match reader.u8("comparison op")? {
        0 => CmpOp::Eq,
        1 => CmpOp::Ne,
        2 => CmpOp::Lt,
        3 => CmpOp::Le,
        4 => CmpOp::Gt,
        5 => CmpOp::Ge,
        op => return Err(Error::CorruptSnapshot(format!("unknown comparison op {op}"))),
    };
    let value = reader.uvarint("comparison value")?;
    Ok(VersionCmp { op, value })
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_uvarint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn read_bytes(reader: &mut Reader<'_>, what: &str) -> Result<Vec<u8>> {
    let len = reader.uvarint(what)?;
    Ok(reader.take(len as usize, what)?.to_vec())
}

fn write_uvarint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos == self.bytes.len()
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| Error::CorruptSnapshot(format!("truncated {what}")))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn u32_le(&mut self, what: &str) -> Result<u32> {
        let bytes = self.take(4, what)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn uvarint(&mut self, what: &str) -> Result<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.u8(what)?;
            if shift >= 64 {
                return Err(Error::CorruptSnapshot(format!("varint overflow in {what}")));
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }
}
