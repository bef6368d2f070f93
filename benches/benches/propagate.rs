// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use understory_propagate::{
    GraphIndexer, IndexTable, InlineScheduler, Node, NodeGroup, NodeInfo, PropagationContext,
    PropagationResult, Scheduler, propagate_change,
};

#[derive(Clone)]
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u32(&mut self) -> u32 {
        // Numerical Recipes LCG parameters.
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.0 >> 32) as u32
    }

    fn gen_range(&mut self, upper_exclusive: u32) -> u32 {
        if upper_exclusive == 0 {
            return 0;
        }
        self.next_u32() % upper_exclusive
    }
}

/// `deps[k]` for a random DAG where every kind depends only on lower kinds.
fn random_deps(n: u32, edges_per_node: u32, seed: u64) -> Vec<Vec<u32>> {
    let mut rng = Lcg::new(seed);
    (0..n)
        .map(|kind| {
            (0..edges_per_node.min(kind))
                .map(|_| rng.gen_range(kind))
                .collect()
        })
        .collect()
}

fn build_table(deps: &[Vec<u32>]) -> IndexTable<u32> {
    let mut indexer = GraphIndexer::with_capacity(deps.len());
    for (kind, d) in (0_u32..).zip(deps) {
        indexer.declare(kind, d.iter().copied());
    }
    indexer.build().expect("random DAG is acyclic")
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct Flat;

impl NodeGroup<Cell> for Flat {}

struct CellData {
    info: NodeInfo,
    listeners: RefCell<Vec<Cell>>,
}

#[derive(Clone)]
struct Cell(Rc<CellData>);

impl Node for Cell {
    type Group = Flat;

    fn info(&self) -> Option<NodeInfo> {
        Some(self.0.info)
    }

    fn group(&self) -> Flat {
        Flat
    }

    fn listeners(&self, out: &mut Vec<Self>) {
        out.extend(self.0.listeners.borrow().iter().cloned());
    }

    fn on_propagation(&self, _cx: &PropagationContext<'_, Self>) -> PropagationResult {
        PropagationResult::Changed
    }

    fn is_same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

fn build_cells(table: &IndexTable<u32>, deps: &[Vec<u32>]) -> Vec<Cell> {
    let cells: Vec<Cell> = (0_u32..)
        .zip(deps)
        .map(|(kind, _)| {
            Cell(Rc::new(CellData {
                info: table.get(kind).expect("kind was declared"),
                listeners: RefCell::new(Vec::new()),
            }))
        })
        .collect();
    for (kind, d) in deps.iter().enumerate() {
        for &dep in d {
            cells[dep as usize]
                .0
                .listeners
                .borrow_mut()
                .push(cells[kind].clone());
        }
    }
    cells
}

fn bench_propagate(c: &mut Criterion) {
    let mut group = c.benchmark_group("understory_propagate");
    group.sample_size(50);
    let scheduler: Arc<dyn Scheduler> = Arc::new(InlineScheduler);

    for &(n, edges_per_node) in &[
        (256_u32, 1_u32),
        (256_u32, 4_u32),
        (4_096_u32, 1_u32),
        (4_096_u32, 4_u32),
    ] {
        let deps = random_deps(n, edges_per_node, 0xD1A7_0000_0000_0001);

        group.bench_function(format!("build_index(n={n},e={edges_per_node})"), |b| {
            b.iter(|| black_box(build_table(black_box(&deps))));
        });

        let table = build_table(&deps);
        group.bench_function(format!("propagate_from_root(n={n},e={edges_per_node})"), |b| {
            b.iter_batched(
                || build_cells(&table, &deps),
                |cells| {
                    let summary = propagate_change(cells[0].clone(), scheduler.clone(), |_| {
                        PropagationResult::Changed
                    })
                    .expect("acyclic propagation succeeds");
                    black_box(summary);
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_propagate);
criterion_main!(benches);
