//! Query compilation.
//!
//! Lowers a query's steps into a `Plan`: join levels, innermost calculations,
//! aggregates and a projection, all addressing bound facts by position. Two
//! index spaces are used. Registers hold the facts bound while the join
//! recursion runs (one per select and per calculation); slots are the
//! positions of an unprojected row (selects, stored calculations, aggregates
//! and the ordinal, in that order).

use crate::ast::{Binding, Direction, FieldRef, Limit, Mapping, ORDINAL};
use crate::context::QueryContext;
use crate::functions::FunctionDef;
use crate::query::{Query, Slot, StepKind};
use core::cmp::Ordering;
use core::fmt;
use hashbrown::HashMap;
use std::rc::Rc;
use tessera_core::{Error, Result, Value};

/// A value resolved from a bound fact or a literal.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Arg {
    /// `field` of the fact at register (or slot) `index`
    Field { index: usize, field: String },
    Constant(Value),
}

impl Arg {
    pub(crate) fn resolve<'a>(&'a self, bound: &'a [Slot]) -> Option<&'a Value> {
        match self {
            Arg::Field { index, field } => bound.get(*index)?.as_ref()?.get(field),
            Arg::Constant(value) => Some(value),
        }
    }
}

/// Resolves every argument, or nothing if any is unbound.
pub(crate) fn resolve_all(args: &[Arg], bound: &[Slot]) -> Option<Vec<Value>> {
    args.iter().map(|arg| arg.resolve(bound).cloned()).collect()
}

#[derive(Clone, Debug)]
pub(crate) struct JoinPlan {
    pub table: String,
    pub negated: bool,
    pub register: Option<usize>,
    pub lookup: Vec<(String, Arg)>,
}

#[derive(Clone, Debug)]
pub(crate) struct CalcPlan {
    pub function: Rc<FunctionDef>,
    pub register: usize,
    pub args: Vec<Arg>,
}

#[derive(Clone, Debug)]
pub(crate) struct AggregatePlan {
    pub function: Rc<FunctionDef>,
    pub slot: usize,
    pub args: Vec<Arg>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SlotKey {
    pub slot: usize,
    pub field: String,
    pub direction: Direction,
}

/// Orders two unprojected rows.
pub(crate) type RowComparator = Rc<dyn Fn(&[Slot], &[Slot]) -> Ordering>;

pub(crate) fn slot_value<'a>(row: &'a [Slot], slot: usize, field: &str) -> Option<&'a Value> {
    row.get(slot)?.as_ref()?.get(field)
}

fn row_comparator(keys: Vec<SlotKey>) -> RowComparator {
    Rc::new(move |a, b| {
        for key in &keys {
            // a missing field sorts before every value
            let ord = slot_value(a, key.slot, &key.field).cmp(&slot_value(b, key.slot, &key.field));
            if ord != Ordering::Equal {
                return match key.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                };
            }
        }
        Ordering::Equal
    })
}

/// A compiled query.
#[derive(Clone)]
pub(crate) struct Plan {
    pub(crate) joins: Vec<JoinPlan>,
    pub(crate) calcs: Vec<CalcPlan>,
    pub(crate) aggregates: Vec<AggregatePlan>,
    pub(crate) registers: usize,
    /// Register of each select and stored calculation slot, in slot order
    pub(crate) stored: Vec<usize>,
    pub(crate) stride: usize,
    pub(crate) group_keys: Vec<(usize, String)>,
    pub(crate) sort_keys: Vec<SlotKey>,
    pub(crate) order: Option<RowComparator>,
    pub(crate) ordinal_slot: Option<usize>,
    pub(crate) limit: Limit,
    pub(crate) aggregate_loop: bool,
    pub(crate) projection: Option<Vec<(String, Arg)>>,
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("joins", &self.joins)
            .field("calcs", &self.calcs)
            .field("aggregates", &self.aggregates)
            .field("stride", &self.stride)
            .field("sort_keys", &self.sort_keys)
            .field("limit", &self.limit)
            .field("ordinal_slot", &self.ordinal_slot)
            .field("projection", &self.projection)
            .finish()
    }
}

/// Register and slot assigned to one step.
#[derive(Clone, Copy, Default)]
struct Place {
    register: Option<usize>,
    slot: Option<usize>,
}

struct Compiler<'q, C: ?Sized> {
    query: &'q Query,
    ctx: &'q C,
    places: Vec<Place>,
    functions: Vec<Option<Rc<FunctionDef>>>,
    /// Alias → step index, filled in declaration order
    aliases: HashMap<&'q str, usize>,
    ordinal_slot: Option<usize>,
}

impl<'q, C: QueryContext + ?Sized> Compiler<'q, C> {
    fn new(query: &'q Query, ctx: &'q C) -> Result<Self> {
        let steps = &query.steps;
        let mut functions = Vec::with_capacity(steps.len());
        for step in steps {
            let function = match step.kind {
                StepKind::Select | StepKind::Deselect => None,
                StepKind::Calculate | StepKind::Aggregate => {
                    let def = ctx
                        .functions()
                        .get(&step.source)
                        .ok_or_else(|| Error::unknown_function(&step.source))?;
                    if step.kind == StepKind::Calculate && def.is_aggregate() {
                        return Err(Error::invalid_function(&step.source, "an aggregate cannot be calculated per row"));
                    }
                    if step.kind == StepKind::Aggregate && !def.is_aggregate() {
                        return Err(Error::invalid_function(&step.source, "not an aggregate"));
                    }
                    Some(def)
                }
            };
            functions.push(function);
        }

        let mut places = vec![Place::default(); steps.len()];
        let mut registers = 0;
        for (ix, step) in steps.iter().enumerate() {
            if matches!(step.kind, StepKind::Select | StepKind::Calculate) {
                places[ix].register = Some(registers);
                registers += 1;
            }
        }
        let mut slots = 0;
        let stored_calc = |ix: usize| functions[ix].as_ref().map_or(false, |f| f.is_stored());
        for kind in [StepKind::Select, StepKind::Calculate, StepKind::Aggregate] {
            for (ix, step) in steps.iter().enumerate() {
                let takes_slot = step.kind == kind && (kind != StepKind::Calculate || stored_calc(ix));
                if takes_slot {
                    places[ix].slot = Some(slots);
                    slots += 1;
                }
            }
        }
        let ordinal_slot = query.ordinal.then_some(slots);

        Ok(Self {
            query,
            ctx,
            places,
            functions,
            aliases: HashMap::new(),
            ordinal_slot,
        })
    }

    fn check_field(&self, table: &str, field: &str) -> Result<()> {
        let fields = self.ctx.fields(table);
        if fields.is_empty() || fields.iter().any(|f| f == field) {
            Ok(())
        } else {
            Err(Error::unknown_field(table, field, fields))
        }
    }

    fn step_of(&self, alias: &str) -> Result<usize> {
        self.aliases.get(alias).copied().ok_or_else(|| Error::invalid_alias(alias))
    }

    /// Resolves a reference from a join map: only selects are bound there.
    fn join_arg(&self, binding: &Binding) -> Result<Arg> {
        match binding {
            Binding::Constant(value) => Ok(Arg::Constant(value.clone())),
            Binding::Field(FieldRef { source, field }) => {
                let ix = self.step_of(source)?;
                let step = &self.query.steps[ix];
                match (step.kind, self.places[ix].register) {
                    (StepKind::Select, Some(index)) => {
                        self.check_field(&step.source, field)?;
                        Ok(Arg::Field {
                            index,
                            field: field.clone(),
                        })
                    }
                    _ => Err(Error::invalid_alias(source.as_str())),
                }
            }
        }
    }

    /// Resolves a reference from calculation arguments: selects and
    /// calculations, by register.
    fn calc_arg(&self, binding: &Binding) -> Result<Arg> {
        match binding {
            Binding::Constant(value) => Ok(Arg::Constant(value.clone())),
            Binding::Field(FieldRef { source, field }) => {
                let ix = self.step_of(source)?;
                match self.places[ix].register {
                    Some(index) => Ok(Arg::Field {
                        index,
                        field: field.clone(),
                    }),
                    None => Err(Error::invalid_alias(source.as_str())),
                }
            }
        }
    }

    /// Resolves a reference to a row slot. Aggregates and the ordinal are
    /// only visible to the projection.
    fn slot_arg(&self, binding: &Binding, projected: bool) -> Result<Arg> {
        match binding {
            Binding::Constant(value) => Ok(Arg::Constant(value.clone())),
            Binding::Field(FieldRef { source, field }) => {
                if source == ORDINAL && !self.aliases.contains_key(ORDINAL) {
                    return match (projected, self.ordinal_slot) {
                        (true, Some(index)) => Ok(Arg::Field {
                            index,
                            field: field.clone(),
                        }),
                        _ => Err(Error::invalid_alias(ORDINAL)),
                    };
                }
                let ix = self.step_of(source)?;
                let step = &self.query.steps[ix];
                let visible = projected || step.kind != StepKind::Aggregate;
                match self.places[ix].slot {
                    Some(index) if visible => {
                        if step.kind == StepKind::Select {
                            self.check_field(&step.source, field)?;
                        }
                        Ok(Arg::Field {
                            index,
                            field: field.clone(),
                        })
                    }
                    _ => Err(Error::invalid_alias(source.as_str())),
                }
            }
        }
    }

    fn bind_params(
        &self,
        function: &FunctionDef,
        args: &Mapping,
        resolve: impl Fn(&Self, &Binding) -> Result<Arg>,
    ) -> Result<Vec<Arg>> {
        function
            .params()
            .iter()
            .map(|param| {
                let binding = args
                    .iter()
                    .find(|(name, _)| name == param)
                    .map(|(_, binding)| binding)
                    .ok_or_else(|| Error::missing_argument(function.name(), param.as_str()))?;
                resolve(self, binding)
            })
            .collect()
    }

    fn slot_of(&self, field: &FieldRef) -> Result<(usize, String)> {
        match self.slot_arg(&Binding::Field(field.clone()), false)? {
            Arg::Field { index, field } => Ok((index, field)),
            Arg::Constant(_) => Err(Error::invalid_alias(field.source.as_str())),
        }
    }

    fn compile(mut self) -> Result<Plan> {
        let query = self.query;
        let mut joins = Vec::new();
        let mut calcs = Vec::new();
        let mut aggregates = Vec::new();

        for (ix, step) in query.steps.iter().enumerate() {
            let place = self.places[ix];
            match step.kind {
                StepKind::Select | StepKind::Deselect => {
                    let mut lookup = Vec::with_capacity(step.mapping.len());
                    for (target, binding) in &step.mapping {
                        self.check_field(&step.source, target)?;
                        lookup.push((target.clone(), self.join_arg(binding)?));
                    }
                    joins.push(JoinPlan {
                        table: step.source.clone(),
                        negated: step.kind == StepKind::Deselect,
                        register: place.register,
                        lookup,
                    });
                }
                StepKind::Calculate => {
                    if let (Some(function), Some(register)) = (self.functions[ix].clone(), place.register) {
                        let args = self.bind_params(&function, &step.mapping, Self::calc_arg)?;
                        calcs.push(CalcPlan {
                            function,
                            register,
                            args,
                        });
                    }
                }
                StepKind::Aggregate => {
                    if let (Some(function), Some(slot)) = (self.functions[ix].clone(), place.slot) {
                        let args = self.bind_params(&function, &step.mapping, |c, b| c.slot_arg(b, false))?;
                        aggregates.push(AggregatePlan { function, slot, args });
                    }
                }
            }
            if let Some(alias) = &step.alias {
                self.aliases.insert(alias.as_str(), ix);
            }
        }

        let group_keys = query
            .groups
            .iter()
            .map(|field| self.slot_of(field))
            .collect::<Result<Vec<_>>>()?;
        let mut sort_keys: Vec<SlotKey> = group_keys
            .iter()
            .map(|(slot, field)| SlotKey {
                slot: *slot,
                field: field.clone(),
                direction: Direction::Ascending,
            })
            .collect();
        for key in &query.sorts {
            let (slot, field) = self.slot_of(&key.field)?;
            if !group_keys.iter().any(|(s, f)| *s == slot && *f == field) {
                sort_keys.push(SlotKey {
                    slot,
                    field,
                    direction: key.direction,
                });
            }
        }

        let projection = match &query.projection {
            Some(fields) => Some(
                fields
                    .iter()
                    .map(|(name, binding)| Ok((name.clone(), self.slot_arg(binding, true)?)))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };

        let mut stored: Vec<(usize, usize)> = self
            .places
            .iter()
            .enumerate()
            .filter(|(ix, _)| query.steps[*ix].kind != StepKind::Aggregate)
            .filter_map(|(_, place)| Some((place.slot?, place.register?)))
            .collect();
        stored.sort_unstable();
        let stored: Vec<usize> = stored.into_iter().map(|(_, register)| register).collect();

        let stride = stored.len() + aggregates.len() + usize::from(self.ordinal_slot.is_some());
        let registers = self.places.iter().filter(|p| p.register.is_some()).count();
        let aggregate_loop =
            !aggregates.is_empty() || !sort_keys.is_empty() || query.limit.is_some() || query.ordinal;
        let order = (!sort_keys.is_empty()).then(|| row_comparator(sort_keys.clone()));

        Ok(Plan {
            joins,
            calcs,
            aggregates,
            registers,
            stored,
            stride,
            group_keys,
            sort_keys,
            order,
            ordinal_slot: self.ordinal_slot,
            limit: query.limit.unwrap_or_default(),
            aggregate_loop,
            projection,
        })
    }
}

/// Compiles a query against the tables and functions of `ctx`.
pub(crate) fn compile<C: QueryContext + ?Sized>(query: &Query, ctx: &C) -> Result<Plan> {
    Compiler::new(query, ctx)?.compile()
}
