// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Static index assignment for node kinds.
//!
//! [`GraphIndexer`] turns a declared dependency graph over node kinds into an
//! [`IndexTable`]: every kind receives a [`NodeIndex`] (its position in a
//! topological order) and a [`PassIndex`] (the wave it is processed in).
//!
//! The topological sort uses Kahn's algorithm with a fixed tie-break: among
//! the kinds that are ready at a given step, the one with the lowest pass is
//! ordered first, and among those the one declared first. As a consequence
//! every pass occupies a contiguous [`NodeIndex`] range and pass ranges are
//! laid out in ascending pass order.

use alloc::collections::BinaryHeap;
use alloc::vec::Vec;
use core::any::TypeId;
use core::cmp::Reverse;
use core::fmt;
use core::hash::Hash;

use hashbrown::HashMap;
use hashbrown::hash_map::Entry;

/// Position of a node kind in topological order.
///
/// If kind `B` is a direct dependency of kind `A`, then
/// `index(B) < index(A)`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct NodeIndex(u32);

impl NodeIndex {
    /// Creates an index from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw numeric index.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns this index as a `usize`, for slot arenas.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The wave a node kind is processed in, plus the index range of that wave.
///
/// `pass(n) = 1 + max(pass(dep))` over the direct dependencies of `n`, or `0`
/// when `n` has none. `min_node..=max_node` spans every kind sharing the pass.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PassIndex {
    pass: u32,
    min_node: NodeIndex,
    max_node: NodeIndex,
}

impl PassIndex {
    /// Creates a pass descriptor.
    ///
    /// Tables built by [`GraphIndexer`] fill these in; hosts that assign
    /// indices by other means can construct them directly.
    #[must_use]
    pub const fn new(pass: u32, min_node: NodeIndex, max_node: NodeIndex) -> Self {
        Self {
            pass,
            min_node,
            max_node,
        }
    }

    /// Returns the wave number.
    #[inline]
    #[must_use]
    pub const fn pass(&self) -> u32 {
        self.pass
    }

    /// Returns the lowest index sharing this pass.
    #[inline]
    #[must_use]
    pub const fn min_node(&self) -> NodeIndex {
        self.min_node
    }

    /// Returns the highest index sharing this pass.
    #[inline]
    #[must_use]
    pub const fn max_node(&self) -> NodeIndex {
        self.max_node
    }

    /// Returns `true` if `index` lies inside this pass's range.
    #[must_use]
    pub fn contains(&self, index: NodeIndex) -> bool {
        self.min_node <= index && index <= self.max_node
    }
}

/// Static index information of a node kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeInfo {
    /// Topological position.
    pub index: NodeIndex,
    /// Wave and wave range.
    pub pass: PassIndex,
}

/// Error returned when building an [`IndexTable`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IndexError<K> {
    /// The declared dependencies contain a cycle.
    ///
    /// `unresolved` lists every kind that could not be ordered, in
    /// declaration order.
    #[error("dependency cycle among node kinds {unresolved:?}")]
    CycleDetected {
        /// Kinds left with unresolved dependencies.
        unresolved: Vec<K>,
    },
    /// The same kind was declared twice.
    #[error("node kind {kind:?} is declared more than once")]
    DuplicateKind {
        /// The repeated kind.
        kind: K,
    },
    /// A dependency names a kind that was never declared.
    #[error("node kind {kind:?} depends on undeclared kind {dependency:?}")]
    UnknownDependency {
        /// The declaring kind.
        kind: K,
        /// The missing dependency.
        dependency: K,
    },
    /// An implementation type was registered for a kind that was never declared.
    #[error("implementation registered for undeclared node kind {kind:?}")]
    UnknownKind {
        /// The missing kind.
        kind: K,
    },
    /// More kinds were declared than a [`NodeIndex`] can address.
    #[error("{count} node kinds declared, more than a node index can address")]
    TooManyKinds {
        /// Number of declared kinds.
        count: usize,
    },
    /// A build-once holder already contains a table.
    #[error("index table is already built")]
    InvalidReentry,
}

/// One row of an [`IndexTable`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry<K> {
    /// The node kind.
    pub kind: K,
    /// Its assigned index information.
    pub info: NodeInfo,
}

/// Declarative registration of node kinds and their direct dependencies.
///
/// # Example
///
/// ```
/// use understory_propagate::GraphIndexer;
///
/// let mut indexer = GraphIndexer::new();
/// indexer.declare("a", []);
/// indexer.declare("b", ["a"]);
/// indexer.declare("c", ["a"]);
///
/// let table = indexer.build().unwrap();
/// let b = table.get("b").unwrap();
/// assert_eq!(b.index.as_u32(), 1);
/// assert_eq!(b.pass.pass(), 1);
/// assert_eq!(table.get("c").unwrap().pass, b.pass);
/// ```
#[derive(Debug, Clone)]
pub struct GraphIndexer<K>
where
    K: Copy + Eq + Hash,
{
    /// Kinds in declaration order.
    kinds: Vec<K>,
    /// Direct dependencies, parallel to `kinds`.
    dependencies: Vec<Vec<K>>,
    implementations: Vec<(TypeId, K)>,
}

impl<K> Default for GraphIndexer<K>
where
    K: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> GraphIndexer<K>
where
    K: Copy + Eq + Hash,
{
    /// Creates an empty indexer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            kinds: Vec::new(),
            dependencies: Vec::new(),
            implementations: Vec::new(),
        }
    }

    /// Creates an empty indexer with room for `capacity` kinds.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            kinds: Vec::with_capacity(capacity),
            dependencies: Vec::with_capacity(capacity),
            implementations: Vec::new(),
        }
    }

    /// Returns the number of declared kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Returns `true` if no kind has been declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Declares `kind` with its direct dependencies.
    ///
    /// Repeated dependency entries are collapsed. Validation (duplicate kinds,
    /// undeclared dependencies, cycles) happens in [`build`](Self::build).
    pub fn declare(&mut self, kind: K, dependencies: impl IntoIterator<Item = K>) -> &mut Self {
        let mut deps: Vec<K> = Vec::new();
        for dep in dependencies {
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }
        self.kinds.push(kind);
        self.dependencies.push(deps);
        self
    }

    /// Associates the implementation type `T` with `kind`.
    ///
    /// The built table then answers [`IndexTable::get_by_type::<T>`](IndexTable::get_by_type).
    /// Registering the same type twice keeps the last registration.
    pub fn implementation<T: ?Sized + 'static>(&mut self, kind: K) -> &mut Self {
        self.implementations.push((TypeId::of::<T>(), kind));
        self
    }

    /// Sorts the declared kinds and assigns indices and passes.
    ///
    /// Fails without producing a partial table if the declarations are
    /// inconsistent or cyclic.
    pub fn build(&self) -> Result<IndexTable<K>, IndexError<K>> {
        let n = self.kinds.len();
        check_kind_count(n)?;

        let mut ordinal: HashMap<K, usize> = HashMap::with_capacity(n);
        for (i, &kind) in self.kinds.iter().enumerate() {
            match ordinal.entry(kind) {
                Entry::Occupied(_) => return Err(IndexError::DuplicateKind { kind }),
                Entry::Vacant(e) => {
                    e.insert(i);
                }
            }
        }

        // Dependencies as ordinals, and the reverse (dependents) adjacency.
        let mut deps: Vec<Vec<usize>> = Vec::with_capacity(n);
        let mut dependents: Vec<Vec<usize>> = alloc::vec![Vec::new(); n];
        for (i, declared) in self.dependencies.iter().enumerate() {
            let mut row = Vec::with_capacity(declared.len());
            for &dep in declared {
                let Some(&d) = ordinal.get(&dep) else {
                    return Err(IndexError::UnknownDependency {
                        kind: self.kinds[i],
                        dependency: dep,
                    });
                };
                row.push(d);
                dependents[d].push(i);
            }
            deps.push(row);
        }

        // Kahn's algorithm. Ready kinds are keyed by (pass, declaration
        // ordinal) so the lowest pass drains first.
        let mut in_degree: Vec<usize> = deps.iter().map(Vec::len).collect();
        let mut ready_pass: Vec<u32> = alloc::vec![0; n];
        let mut ready: BinaryHeap<Reverse<(u32, usize)>> = BinaryHeap::with_capacity(n);
        for (i, &deg) in in_degree.iter().enumerate() {
            if deg == 0 {
                ready.push(Reverse((0, i)));
            }
        }

        let mut order: Vec<usize> = Vec::with_capacity(n);
        while let Some(Reverse((pass, i))) = ready.pop() {
            order.push(i);
            for &dependent in &dependents[i] {
                ready_pass[dependent] = ready_pass[dependent].max(pass + 1);
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(Reverse((ready_pass[dependent], dependent)));
                }
            }
        }

        if order.len() < n {
            let unresolved = self
                .kinds
                .iter()
                .zip(&in_degree)
                .filter(|&(_, &deg)| deg > 0)
                .map(|(&kind, _)| kind)
                .collect();
            return Err(IndexError::CycleDetected { unresolved });
        }

        // Second pass: passes from dependency passes, and per-pass ranges.
        let mut position: Vec<u32> = alloc::vec![0; n];
        let mut pass_of: Vec<u32> = alloc::vec![0; n];
        let mut ranges: Vec<(NodeIndex, NodeIndex)> = Vec::new();
        for (pos, &i) in order.iter().enumerate() {
            let index = NodeIndex(u32::try_from(pos).map_err(|_| too_many(n))?);
            position[i] = index.0;
            let pass = deps[i]
                .iter()
                .map(|&d| pass_of[d])
                .max()
                .map_or(0, |p| p + 1);
            pass_of[i] = pass;

            let slot = pass as usize;
            if slot >= ranges.len() {
                ranges.resize(slot + 1, (index, index));
            }
            let range = &mut ranges[slot];
            range.0 = range.0.min(index);
            range.1 = range.1.max(index);
        }

        let passes: Vec<PassIndex> = ranges
            .iter()
            .enumerate()
            .map(|(p, &(min, max))| -> Result<PassIndex, IndexError<K>> {
                Ok(PassIndex::new(u32::try_from(p).map_err(|_| too_many(n))?, min, max))
            })
            .collect::<Result<_, _>>()?;

        let entries: Vec<IndexEntry<K>> = order
            .iter()
            .map(|&i| IndexEntry {
                kind: self.kinds[i],
                info: NodeInfo {
                    index: NodeIndex(position[i]),
                    pass: passes[pass_of[i] as usize],
                },
            })
            .collect();

        let mut by_kind: HashMap<K, usize> = HashMap::with_capacity(n);
        for (pos, entry) in entries.iter().enumerate() {
            by_kind.insert(entry.kind, pos);
        }

        let mut by_type: HashMap<TypeId, usize> =
            HashMap::with_capacity(self.implementations.len());
        for &(type_id, kind) in &self.implementations {
            let Some(&pos) = by_kind.get(&kind) else {
                return Err(IndexError::UnknownKind { kind });
            };
            by_type.insert(type_id, pos);
        }

        tracing::debug!(kinds = n, passes = passes.len(), "built node index table");

        Ok(IndexTable {
            entries,
            by_kind,
            by_type,
            passes,
        })
    }
}

/// Largest number of kinds one [`IndexTable`] can hold.
///
/// Indices are `u32`, and the position one past the last index must still be
/// representable.
pub const MAX_KINDS: usize = u32::MAX as usize;

fn too_many<K>(count: usize) -> IndexError<K> {
    IndexError::TooManyKinds { count }
}

fn check_kind_count<K>(count: usize) -> Result<(), IndexError<K>> {
    if count > MAX_KINDS {
        return Err(too_many(count));
    }
    Ok(())
}

/// Builds an index table from an enumerable set of kinds and a dependency lookup.
///
/// This is the functional form of [`GraphIndexer`]: `lookup` is called once
/// per kind, in iteration order, to obtain its direct dependencies.
///
/// ```
/// use understory_propagate::{IndexError, build_index};
///
/// let err = build_index(["a", "b"], |kind| match kind {
///     "a" => vec!["b"],
///     _ => vec!["a"],
/// })
/// .unwrap_err();
/// assert_eq!(err, IndexError::CycleDetected { unresolved: vec!["a", "b"] });
/// ```
pub fn build_index<K, I, D, F>(kinds: I, mut lookup: F) -> Result<IndexTable<K>, IndexError<K>>
where
    K: Copy + Eq + Hash,
    I: IntoIterator<Item = K>,
    D: IntoIterator<Item = K>,
    F: FnMut(K) -> D,
{
    let mut indexer = GraphIndexer::new();
    for kind in kinds {
        indexer.declare(kind, lookup(kind));
    }
    indexer.build()
}

/// Immutable result of [`GraphIndexer::build`].
#[derive(Debug, Clone)]
pub struct IndexTable<K>
where
    K: Copy + Eq + Hash,
{
    /// Rows in index order: `entries[i].info.index == i`.
    entries: Vec<IndexEntry<K>>,
    by_kind: HashMap<K, usize>,
    by_type: HashMap<TypeId, usize>,
    /// Pass descriptors by pass number.
    passes: Vec<PassIndex>,
}

impl<K> IndexTable<K>
where
    K: Copy + Eq + Hash,
{
    /// Returns the number of kinds in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table holds no kinds.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the index information of `kind`.
    #[must_use]
    pub fn get(&self, kind: K) -> Option<NodeInfo> {
        self.by_kind.get(&kind).map(|&pos| self.entries[pos].info)
    }

    /// Returns the index information registered for implementation type `T`.
    #[must_use]
    pub fn get_by_type<T: ?Sized + 'static>(&self) -> Option<NodeInfo> {
        self.by_type
            .get(&TypeId::of::<T>())
            .map(|&pos| self.entries[pos].info)
    }

    /// Returns the kind placed at `index`.
    #[must_use]
    pub fn kind_at(&self, index: NodeIndex) -> Option<K> {
        self.entries.get(index.as_usize()).map(|e| e.kind)
    }

    /// Returns all rows in index order.
    #[must_use]
    pub fn entries(&self) -> &[IndexEntry<K>] {
        &self.entries
    }

    /// Returns the pass descriptors, by pass number.
    #[must_use]
    pub fn passes(&self) -> &[PassIndex] {
        &self.passes
    }
}

impl<K> fmt::Display for IndexTable<K>
where
    K: Copy + Eq + Hash + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>6} {:>5}  kind", "index", "pass")?;
        for entry in &self.entries {
            writeln!(
                f,
                "{:>6} {:>5}  {:?}",
                entry.info.index,
                entry.info.pass.pass(),
                entry.kind
            )?;
        }
        Ok(())
    }
}

/// Process-wide, build-once holder for an [`IndexTable`].
///
/// ```
/// use understory_propagate::{GraphIndexer, IndexCell};
///
/// static KINDS: IndexCell<&'static str> = IndexCell::new();
///
/// let table = KINDS
///     .get_or_build(|| GraphIndexer::new().declare("a", []).build())
///     .unwrap();
/// assert_eq!(table.len(), 1);
/// ```
#[cfg(feature = "std")]
#[derive(Debug)]
pub struct IndexCell<K>
where
    K: Copy + Eq + Hash,
{
    cell: std::sync::OnceLock<IndexTable<K>>,
}

#[cfg(feature = "std")]
impl<K> Default for IndexCell<K>
where
    K: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl<K> IndexCell<K>
where
    K: Copy + Eq + Hash,
{
    /// Creates an empty cell.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cell: std::sync::OnceLock::new(),
        }
    }

    /// Returns the installed table, if any.
    #[must_use]
    pub fn get(&self) -> Option<&IndexTable<K>> {
        self.cell.get()
    }

    /// Installs `table`.
    ///
    /// Fails with [`IndexError::InvalidReentry`] if a table is already present.
    pub fn install(&self, table: IndexTable<K>) -> Result<&IndexTable<K>, IndexError<K>> {
        self.cell
            .set(table)
            .map_err(|_| IndexError::InvalidReentry)?;
        self.cell.get().ok_or(IndexError::InvalidReentry)
    }

    /// Returns the installed table, building it with `build` on first use.
    ///
    /// If two threads race, both may run `build`; the first table stored wins.
    pub fn get_or_build<F>(&self, build: F) -> Result<&IndexTable<K>, IndexError<K>>
    where
        F: FnOnce() -> Result<IndexTable<K>, IndexError<K>>,
    {
        if let Some(table) = self.cell.get() {
            return Ok(table);
        }
        let table = build()?;
        Ok(self.cell.get_or_init(|| table))
    }
}
