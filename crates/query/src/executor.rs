//! Plan execution.
//!
//! Runs in stages: the join recursion (with calculations at its innermost
//! level) appends rows to a flat buffer, an insertion sort orders the buffer
//! in units of the stride, the aggregate loop walks groups applying limits
//! and folding aggregates, and the projection maps admitted rows to facts.

use crate::functions::Implementation;
use crate::plan::{resolve_all, slot_value, Plan};
use crate::query::{QueryOutput, Slot};
use core::cmp::Ordering;
use std::rc::Rc;
use tessera_core::{fact, Fact};
use tessera_storage::FactSource;

fn row(buffer: &[Slot], stride: usize, ix: usize) -> &[Slot] {
    &buffer[ix * stride..(ix + 1) * stride]
}

/// Stable in-place insertion sort over `rows` rows of `stride` slots.
///
/// Each row is binary-searched into the sorted prefix after every row that
/// compares equal to it, then rotated into place.
fn sort_rows(buffer: &mut [Slot], stride: usize, rows: usize, order: &dyn Fn(&[Slot], &[Slot]) -> Ordering) {
    if stride == 0 {
        return;
    }
    for i in 1..rows {
        let (mut lo, mut hi) = (0, i);
        while lo < hi {
            let mid = (lo + hi) / 2;
            if order(row(buffer, stride, mid), row(buffer, stride, i)) == Ordering::Greater {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        if lo < i {
            buffer[lo * stride..(i + 1) * stride].rotate_right(stride);
        }
    }
}

impl Plan {
    /// Executes the plan against `ctx`.
    pub(crate) fn execute<C: FactSource + ?Sized>(&self, ctx: &mut C) -> QueryOutput {
        let mut registers: Vec<Slot> = vec![None; self.registers];
        let mut buffer: Vec<Slot> = Vec::new();
        let mut rows = 0;
        self.join(ctx, 0, &mut registers, &mut buffer, &mut rows);

        if let Some(order) = &self.order {
            sort_rows(&mut buffer, self.stride, rows, order.as_ref());
        }

        let (admitted, group_info) = if self.aggregate_loop {
            let (admitted, info) = self.aggregate(&mut buffer, rows);
            (admitted, Some(info))
        } else {
            ((0..rows).collect(), None)
        };

        let results = self.projection.as_ref().map(|projection| {
            admitted
                .iter()
                .map(|&ix| {
                    let bound = row(&buffer, self.stride, ix);
                    let mut out = Fact::new();
                    for (name, arg) in projection {
                        if let Some(value) = arg.resolve(bound) {
                            out.insert(name.as_str(), value.clone());
                        }
                    }
                    out
                })
                .collect()
        });

        QueryOutput::new(results, buffer, group_info, self.stride, rows)
    }

    fn join<C: FactSource + ?Sized>(
        &self,
        ctx: &mut C,
        depth: usize,
        registers: &mut [Slot],
        buffer: &mut Vec<Slot>,
        rows: &mut usize,
    ) {
        let Some(join) = self.joins.get(depth) else {
            self.calculate(0, registers, buffer, rows);
            return;
        };

        // an unbound join value matches nothing
        let matches = if join.lookup.is_empty() {
            ctx.find(&join.table, None)
        } else {
            let mut query = Fact::new();
            let mut bound = true;
            for (field, arg) in &join.lookup {
                match arg.resolve(registers) {
                    Some(value) => {
                        query.insert(field.as_str(), value.clone());
                    }
                    None => {
                        bound = false;
                        break;
                    }
                }
            }
            if bound {
                ctx.find(&join.table, Some(&query))
            } else {
                Vec::new()
            }
        };

        if join.negated {
            if matches.is_empty() {
                self.join(ctx, depth + 1, registers, buffer, rows);
            }
            return;
        }
        let Some(register) = join.register else {
            return;
        };
        for fact in matches {
            registers[register] = Some(fact);
            self.join(ctx, depth + 1, registers, buffer, rows);
        }
        registers[register] = None;
    }

    fn calculate(&self, ix: usize, registers: &mut [Slot], buffer: &mut Vec<Slot>, rows: &mut usize) {
        let Some(calc) = self.calcs.get(ix) else {
            buffer.extend(self.stored.iter().map(|&r| registers[r].clone()));
            buffer.resize(buffer.len() + self.stride - self.stored.len(), None);
            *rows += 1;
            return;
        };
        // an unresolved argument drops the branch
        let Some(args) = resolve_all(&calc.args, registers) else {
            return;
        };
        match calc.function.implementation() {
            Implementation::Scalar(f) => {
                if let Some(result) = f(&args) {
                    registers[calc.register] = Some(Rc::new(result));
                    self.calculate(ix + 1, registers, buffer, rows);
                }
            }
            Implementation::Multi(f) => {
                for result in f(&args) {
                    registers[calc.register] = Some(Rc::new(result));
                    self.calculate(ix + 1, registers, buffer, rows);
                }
            }
            Implementation::Aggregate(_) => {}
        }
        registers[calc.register] = None;
    }

    fn same_group(&self, a: &[Slot], b: &[Slot]) -> bool {
        self.group_keys
            .iter()
            .all(|(slot, field)| slot_value(a, *slot, field) == slot_value(b, *slot, field))
    }

    /// Walks the sorted buffer once, admitting rows under the limits.
    ///
    /// Returns the rows to project and the group (or, ungrouped and without
    /// aggregates, the rank) of every admitted row.
    fn aggregate(&self, buffer: &mut [Slot], rows: usize) -> (Vec<usize>, Vec<Option<usize>>) {
        let offset = self.limit.offset.unwrap_or(0);
        let results = self.limit.results.unwrap_or(usize::MAX);
        let mut info = vec![None; rows];
        let mut projected = Vec::new();

        if !self.group_keys.is_empty() {
            let per_group = self.limit.per_group.unwrap_or(usize::MAX);
            let mut group = 0;
            let mut start = 0;
            while start < rows && group < results {
                let mut end = start + 1;
                while end < rows && self.same_group(row(buffer, self.stride, start), row(buffer, self.stride, end)) {
                    end += 1;
                }
                let admitted: Vec<usize> = (start..end).skip(offset).take(per_group).collect();
                if !admitted.is_empty() {
                    self.finish_group(buffer, &admitted, group, &mut info, &mut projected);
                    group += 1;
                }
                start = end;
            }
        } else if !self.aggregates.is_empty() {
            let admitted: Vec<usize> = (0..rows).skip(offset).take(results).collect();
            if !admitted.is_empty() {
                self.finish_group(buffer, &admitted, 0, &mut info, &mut projected);
            }
        } else {
            for (rank, ix) in (0..rows).skip(offset).take(results).enumerate() {
                info[ix] = Some(rank);
                self.write_ordinal(buffer, ix, rank);
                projected.push(ix);
            }
        }
        (projected, info)
    }

    /// Folds a group's admitted rows and writes the final states into each
    /// of them. The group projects once, from its last admitted row.
    fn finish_group(
        &self,
        buffer: &mut [Slot],
        admitted: &[usize],
        group: usize,
        info: &mut [Option<usize>],
        projected: &mut Vec<usize>,
    ) {
        let mut states = vec![Fact::new(); self.aggregates.len()];
        for &ix in admitted {
            info[ix] = Some(group);
            let bound = row(buffer, self.stride, ix);
            for (aggregate, state) in self.aggregates.iter().zip(states.iter_mut()) {
                if let (Implementation::Aggregate(fold), Some(args)) =
                    (aggregate.function.implementation(), resolve_all(&aggregate.args, bound))
                {
                    fold(state, &args);
                }
            }
        }

        let states: Vec<Rc<Fact>> = states.into_iter().map(Rc::new).collect();
        for &ix in admitted {
            for (aggregate, state) in self.aggregates.iter().zip(&states) {
                buffer[ix * self.stride + aggregate.slot] = Some(Rc::clone(state));
            }
            self.write_ordinal(buffer, ix, group);
        }

        if let Some(&last) = admitted.last() {
            projected.push(last);
        }
    }

    fn write_ordinal(&self, buffer: &mut [Slot], ix: usize, rank: usize) {
        if let Some(slot) = self.ordinal_slot {
            buffer[ix * self.stride + slot] = Some(Rc::new(fact! { "ordinal" => rank }));
        }
    }
}
