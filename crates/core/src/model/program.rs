use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::ir::{IrBlock, JumpKind};

/// Architecture parameters the analyses care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arch {
    /// Width of registers and memory words in bits.
    pub bits: u32,
    /// Required alignment of instruction addresses.
    pub instruction_alignment: u64,
}

impl Arch {
    pub fn word_bytes(&self) -> usize {
        (self.bits / 8) as usize
    }
}

impl Default for Arch {
    fn default() -> Self {
        Self { bits: 64, instruction_alignment: 1 }
    }
}

/// A contiguous mapped memory region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub start: u64,
    #[serde(default)]
    pub data: Vec<u8>,
    #[serde(default = "default_true")]
    pub readable: bool,
    #[serde(default)]
    pub writable: bool,
    #[serde(default)]
    pub executable: bool,
}

fn default_true() -> bool {
    true
}

impl Segment {
    /// A read-only, executable segment (typical `.text`).
    pub fn code(start: u64, data: Vec<u8>) -> Self {
        Self { start, data, readable: true, writable: false, executable: true }
    }

    /// A read-only, non-executable segment (typical `.rodata`).
    pub fn rodata(start: u64, data: Vec<u8>) -> Self {
        Self { start, data, readable: true, writable: false, executable: false }
    }

    /// A writable data segment.
    pub fn data(start: u64, data: Vec<u8>) -> Self {
        Self { start, data, readable: true, writable: true, executable: false }
    }

    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.data.len() as u64)
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end()
    }

    /// Read `len` little-endian bytes at `addr`, if fully contained.
    pub fn read_le(&self, addr: u64, len: usize) -> Option<u64> {
        if !self.contains(addr) || len == 0 || len > 8 {
            return None;
        }
        let offset = usize::try_from(addr - self.start).ok()?;
        let bytes = self.data.get(offset..offset.checked_add(len)?)?;
        Some(bytes.iter().rev().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }
}

/// A function: its lifted blocks and the indirect edges resolved so far.
///
/// Blocks and edges change only through the builder and
/// [`Function::record_resolved`], which keeps the memoized fingerprint honest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub addr: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(with = "block_list")]
    blocks: BTreeMap<u64, IrBlock>,
    /// Targets recorded for indirect transfers, keyed by block address.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    resolved: BTreeMap<u64, Vec<u64>>,
    #[serde(skip)]
    digest: DigestCell,
}

/// Memoized fingerprint; never part of equality.
#[derive(Debug, Clone, Default)]
struct DigestCell(OnceLock<String>);

impl PartialEq for DigestCell {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for DigestCell {}

impl Function {
    pub fn new(addr: u64) -> Self {
        Self {
            addr,
            name: None,
            blocks: BTreeMap::new(),
            resolved: BTreeMap::new(),
            digest: DigestCell::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_block(mut self, block: IrBlock) -> Self {
        self.blocks.insert(block.addr, block);
        self.digest = DigestCell::default();
        self
    }

    pub fn blocks(&self) -> &BTreeMap<u64, IrBlock> {
        &self.blocks
    }

    /// Indirect targets recorded so far, keyed by block address.
    pub fn resolved(&self) -> &BTreeMap<u64, Vec<u64>> {
        &self.resolved
    }

    /// SHA-256 over the address, blocks and resolved edges.
    ///
    /// Computed once and reused until the blocks or edges change.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        if let Some(digest) = self.digest.0.get() {
            return Ok(digest.clone());
        }
        let bytes = serde_json::to_vec(&(self.addr, &self.blocks, &self.resolved))?;
        let digest = format!("{:x}", Sha256::digest(&bytes));
        Ok(self.digest.0.get_or_init(|| digest).clone())
    }

    pub fn block(&self, addr: u64) -> Option<&IrBlock> {
        self.blocks.get(&addr)
    }

    pub fn entry(&self) -> Option<&IrBlock> {
        self.blocks.get(&self.addr)
    }

    /// Intraprocedural successors of the block at `addr`.
    pub fn successors(&self, addr: u64) -> Vec<u64> {
        let Some(block) = self.blocks.get(&addr) else {
            return Vec::new();
        };
        let mut succs: Vec<u64> = block.static_targets();
        if let Some(extra) = self.resolved.get(&addr) {
            succs.extend(extra.iter().copied());
        }
        let mut seen = BTreeSet::new();
        succs.retain(|target| self.blocks.contains_key(target) && seen.insert(*target));
        succs
    }

    /// Predecessor lists for every block of the function.
    pub fn predecessors(&self) -> BTreeMap<u64, Vec<u64>> {
        let mut preds: BTreeMap<u64, Vec<u64>> =
            self.blocks.keys().map(|addr| (*addr, Vec::new())).collect();
        for addr in self.blocks.keys() {
            for succ in self.successors(*addr) {
                preds.entry(succ).or_default().push(*addr);
            }
        }
        preds
    }

    /// Blocks ending in a transfer whose target is not a literal.
    pub fn indirect_blocks(&self) -> impl Iterator<Item = &IrBlock> {
        self.blocks
            .values()
            .filter(|block| block.next.as_const().is_none() && block.jump_kind != JumpKind::Return)
    }

    /// Targets outside the function that the block at `addr` hands control
    /// to: callees, tail jumps and side exits, literal or resolved.
    pub fn external_targets(&self, addr: u64) -> BTreeSet<u64> {
        let Some(block) = self.blocks.get(&addr) else {
            return BTreeSet::new();
        };
        let resolved = self.resolved.get(&addr).into_iter().flatten().copied();
        let mut targets: BTreeSet<u64> = block
            .static_targets()
            .into_iter()
            .filter(|target| !self.blocks.contains_key(target))
            .collect();
        if block.jump_kind == JumpKind::Call {
            // A call leaves the function even when it targets its own entry.
            targets.extend(block.next.as_const());
            targets.extend(resolved);
        } else {
            targets.extend(resolved.filter(|target| !self.blocks.contains_key(target)));
        }
        targets
    }

    /// Whether any block calls or tail-jumps to `target`.
    pub fn transfers_to(&self, target: u64) -> bool {
        self.blocks.keys().any(|addr| self.external_targets(*addr).contains(&target))
    }

    /// Record resolved targets for the transfer ending the block at `block_addr`.
    pub fn record_resolved(&mut self, block_addr: u64, targets: &[u64]) {
        let entry = self.resolved.entry(block_addr).or_default();
        for target in targets {
            if !entry.contains(target) {
                entry.push(*target);
            }
        }
        self.digest = DigestCell::default();
    }
}

/// A lifted program: memory image, functions, and special addresses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    #[serde(default)]
    pub arch: Arch,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(with = "function_list")]
    pub functions: BTreeMap<u64, Function>,
    /// Addresses replaced by host-side hooks (e.g. SimProcedures, stubs).
    #[serde(default)]
    pub hooks: BTreeSet<u64>,
    /// Addresses that stand for system call entry points.
    #[serde(default)]
    pub syscalls: BTreeSet<u64>,
}

impl Program {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn with_arch(mut self, arch: Arch) -> Self {
        self.arch = arch;
        self
    }

    pub fn with_segment(mut self, segment: Segment) -> Self {
        self.segments.push(segment);
        self
    }

    pub fn with_function(mut self, function: Function) -> Self {
        self.functions.insert(function.addr, function);
        self
    }

    pub fn with_hook(mut self, addr: u64) -> Self {
        self.hooks.insert(addr);
        self
    }

    pub fn function(&self, addr: u64) -> Option<&Function> {
        self.functions.get(&addr)
    }

    pub fn function_mut(&mut self, addr: u64) -> Option<&mut Function> {
        self.functions.get_mut(&addr)
    }

    pub fn segment_containing(&self, addr: u64) -> Option<&Segment> {
        self.segments.iter().find(|seg| seg.contains(addr))
    }

    /// Read one machine word from memory that cannot change at runtime.
    pub fn read_only_word(&self, addr: u64) -> Option<u64> {
        let segment = self.segment_containing(addr)?;
        if !segment.readable || segment.writable {
            return None;
        }
        segment.read_le(addr, self.arch.word_bytes())
    }
}

/// One indirect control transfer offered to the resolver chain.
#[derive(Debug, Clone, Copy)]
pub struct JumpSite<'a> {
    /// Address of the jumping instruction.
    pub addr: u64,
    /// Address of the enclosing function.
    pub func_addr: u64,
    pub block: &'a IrBlock,
    pub jump_kind: JumpKind,
}

impl<'a> JumpSite<'a> {
    pub fn new(func_addr: u64, block: &'a IrBlock) -> Self {
        Self {
            addr: block.last_instruction_addr(),
            func_addr,
            block,
            jump_kind: block.jump_kind,
        }
    }
}

mod block_list {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::model::IrBlock;

    pub fn serialize<S: Serializer>(
        blocks: &BTreeMap<u64, IrBlock>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let list: Vec<&IrBlock> = blocks.values().collect();
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<u64, IrBlock>, D::Error> {
        let list = Vec::<IrBlock>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|block| (block.addr, block)).collect())
    }
}

mod function_list {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::model::Function;

    pub fn serialize<S: Serializer>(
        functions: &BTreeMap<u64, Function>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let list: Vec<&Function> = functions.values().collect();
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<u64, Function>, D::Error> {
        let list = Vec::<Function>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|func| (func.addr, func)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Expr, Stmt};

    fn two_block_function() -> Function {
        Function::new(0x1000)
            .with_block(
                IrBlock::new(0x1000, 4, Expr::Const(0x1004), JumpKind::Jump)
                    .with_stmts(vec![Stmt::Exit { guard: Expr::tmp(0), target: 0x9999 }]),
            )
            .with_block(IrBlock::new(0x1004, 4, Expr::tmp(1), JumpKind::Jump))
    }

    #[test]
    fn successors_drop_targets_outside_function() {
        let func = two_block_function();
        assert_eq!(func.successors(0x1000), vec![0x1004]);
        assert!(func.successors(0x1004).is_empty());
        assert_eq!(func.predecessors()[&0x1004], vec![0x1000]);
    }

    #[test]
    fn recorded_targets_become_successors() {
        let mut func = two_block_function();
        func.record_resolved(0x1004, &[0x1000, 0x1000]);
        assert_eq!(func.resolved[&0x1004], vec![0x1000]);
        assert_eq!(func.successors(0x1004), vec![0x1000]);
    }

    #[test]
    fn external_targets_cover_calls_tail_jumps_and_exits() {
        let func = two_block_function()
            .with_block(IrBlock::new(0x1008, 4, Expr::Const(0x5000), JumpKind::Call))
            .with_block(IrBlock::new(0x100c, 2, Expr::Const(0x6000), JumpKind::Jump));
        assert_eq!(func.external_targets(0x1000), BTreeSet::from([0x9999]));
        assert_eq!(func.external_targets(0x1008), BTreeSet::from([0x5000]));
        assert_eq!(func.external_targets(0x100c), BTreeSet::from([0x6000]));
        assert!(func.transfers_to(0x6000));
        assert!(!func.transfers_to(0x1004));
    }

    #[test]
    fn resolved_tail_jumps_leave_the_function() {
        let mut func = two_block_function();
        func.record_resolved(0x1004, &[0x1000, 0x7000]);
        assert_eq!(func.external_targets(0x1004), BTreeSet::from([0x7000]));
    }

    #[test]
    fn fingerprint_is_memoized_until_the_function_changes() {
        let func = two_block_function();
        let first = func.fingerprint().unwrap();
        assert_eq!(func.fingerprint().unwrap(), first);

        let mut grown = func.clone();
        grown.record_resolved(0x1004, &[0x1000]);
        let after_edge = grown.fingerprint().unwrap();
        assert_ne!(after_edge, first);

        grown.record_resolved(0x1004, &[0x1000]);
        assert_eq!(grown.fingerprint().unwrap(), after_edge);

        let extended =
            grown.with_block(IrBlock::new(0x1010, 1, Expr::reg("rip"), JumpKind::Return));
        assert_ne!(extended.fingerprint().unwrap(), after_edge);
    }

    #[test]
    fn read_only_word_skips_writable_segments() {
        let program = Program::new("p")
            .with_segment(Segment::rodata(0x2000, vec![0x20, 0x10, 0x40, 0, 0, 0, 0, 0]))
            .with_segment(Segment::data(0x3000, vec![1, 0, 0, 0, 0, 0, 0, 0]));
        assert_eq!(program.read_only_word(0x2000), Some(0x401020));
        assert_eq!(program.read_only_word(0x2004), None);
        assert_eq!(program.read_only_word(0x3000), None);
    }

    #[test]
    fn program_round_trips_through_json_lists() {
        let program = Program::new("p").with_function(two_block_function());
        let json = serde_json::to_string(&program).unwrap();
        let back: Program = serde_json::from_str(&json).unwrap();
        assert_eq!(back, program);
    }
}
