//! View definitions stored as facts.
//!
//! A view is described by one `view` fact and one `action` fact per step,
//! each action carrying its source and mappings in side tables. Aliases are
//! replaced by the generated action ids, so a definition read back from the
//! catalog references its steps by id.

use crate::ast::{column, Binding, Column, Direction, FieldRef, Limit, Mapping, SortKey};
use crate::query::Query;
use crate::union::Union;
use crate::view::View;
use hashbrown::HashMap;
use std::rc::Rc;
use tessera_core::{fact, Error, Fact, Result, Value};
use tessera_storage::{Diff, FactSource};
use uuid::Uuid;

/// `{view, kind}`
pub const VIEW: &str = "view";
/// `{view, action, kind, ix}`
pub const ACTION: &str = "action";
/// `{action, "source view"}`
pub const ACTION_SOURCE: &str = "action source";
/// `{action, from, "to source", "to field"}`
pub const ACTION_MAPPING: &str = "action mapping";
/// `{action, from, value}`
pub const ACTION_MAPPING_CONSTANT: &str = "action mapping constant";
/// `{action, ix, source, field, direction}`
pub const ACTION_MAPPING_SORTED: &str = "action mapping sorted";
/// `{action, "limit type", value}`
pub const ACTION_MAPPING_LIMIT: &str = "action mapping limit";

/// Every catalog table with its fields.
pub const TABLES: [(&str, &[&str]); 7] = [
    (VIEW, &["view", "kind"]),
    (ACTION, &["view", "action", "kind", "ix"]),
    (ACTION_SOURCE, &["action", "source view"]),
    (ACTION_MAPPING, &["action", "from", "to source", "to field"]),
    (ACTION_MAPPING_CONSTANT, &["action", "from", "value"]),
    (ACTION_MAPPING_SORTED, &["action", "ix", "source", "field", "direction"]),
    (ACTION_MAPPING_LIMIT, &["action", "limit type", "value"]),
];

/// Order position of actions that are not steps.
pub const MAX_IX: f64 = 9_007_199_254_740_991.0;

struct Writer<'a> {
    diff: Diff,
    view: &'a str,
    /// Step alias → action id
    aliases: HashMap<String, String>,
}

impl<'a> Writer<'a> {
    fn new(view: &'a str, kind: &str) -> Self {
        let mut diff = Diff::new();
        diff.add(VIEW, fact! { "view" => view, "kind" => kind });
        Self {
            diff,
            view,
            aliases: HashMap::new(),
        }
    }

    fn action(&mut self, kind: &str, ix: impl Into<Value>) -> String {
        let id = Uuid::new_v4().to_string();
        let ix: Value = ix.into();
        self.diff.add(
            ACTION,
            fact! { "view" => self.view, "action" => id.as_str(), "kind" => kind, "ix" => ix },
        );
        id
    }

    fn source(&mut self, action: &str, table: &str) {
        self.diff.add(ACTION_SOURCE, fact! { "action" => action, "source view" => table });
    }

    fn resolve<'s>(&'s self, alias: &'s str) -> &'s str {
        self.aliases.get(alias).map(String::as_str).unwrap_or(alias)
    }

    fn mapping(&mut self, action: &str, mapping: &Mapping) {
        for (from, binding) in mapping {
            let fact = match binding {
                Binding::Field(FieldRef { source, field }) => fact! {
                    "action" => action,
                    "from" => from.as_str(),
                    "to source" => self.resolve(source),
                    "to field" => field.as_str()
                },
                Binding::Constant(value) => {
                    self.diff.add(
                        ACTION_MAPPING_CONSTANT,
                        fact! { "action" => action, "from" => from.as_str(), "value" => value.clone() },
                    );
                    continue;
                }
            };
            self.diff.add(ACTION_MAPPING, fact);
        }
    }

    fn sorted(&mut self, kind: &str, keys: &[SortKey]) {
        if keys.is_empty() {
            return;
        }
        let action = self.action(kind, MAX_IX);
        for (ix, key) in keys.iter().enumerate() {
            let fact = fact! {
                "action" => action.as_str(),
                "ix" => ix,
                "source" => self.resolve(&key.field.source),
                "field" => key.field.field.as_str(),
                "direction" => key.direction.as_str()
            };
            self.diff.add(ACTION_MAPPING_SORTED, fact);
        }
    }
}

fn query_changeset(query: &Query) -> Diff {
    let mut w = Writer::new(query.name(), "query");
    for (ix, step) in query.steps.iter().enumerate() {
        let action = w.action(step.kind.as_str(), ix);
        w.source(&action, &step.source);
        w.mapping(&action, &step.mapping);
        if let Some(alias) = &step.alias {
            w.aliases.insert(alias.clone(), action);
        }
    }

    let groups: Vec<SortKey> = query.groups.iter().cloned().map(SortKey::from).collect();
    w.sorted("group", &groups);
    w.sorted("sort", &query.sorts);
    if let Some(limit) = query.limit {
        let action = w.action("limit", MAX_IX);
        for (kind, value) in [("results", limit.results), ("perGroup", limit.per_group), ("offset", limit.offset)] {
            if let Some(value) = value {
                w.diff.add(
                    ACTION_MAPPING_LIMIT,
                    fact! { "action" => action.as_str(), "limit type" => kind, "value" => value },
                );
            }
        }
    }
    if query.ordinal {
        w.action("ordinal", MAX_IX);
    }
    if let Some(projection) = &query.projection {
        let action = w.action("project", MAX_IX);
        w.mapping(&action, projection);
    }
    w.diff
}

fn union_changeset(union: &Union) -> Diff {
    let mut w = Writer::new(union.name(), "union");
    for (ix, source) in union.sources.iter().enumerate() {
        let action = w.action(source.kind.as_str(), ix);
        w.source(&action, &source.table);
        for (from, column) in &source.mapping {
            match column {
                Column::Field(field) => w.diff.add(
                    ACTION_MAPPING,
                    fact! {
                        "action" => action.as_str(),
                        "from" => from.as_str(),
                        "to source" => source.table.as_str(),
                        "to field" => field.as_str()
                    },
                ),
                Column::Constant(value) => w.diff.add(
                    ACTION_MAPPING_CONSTANT,
                    fact! { "action" => action.as_str(), "from" => from.as_str(), "value" => value.clone() },
                ),
            };
        }
    }
    if union.stateful {
        w.action("stateful", MAX_IX);
    }
    w.diff
}

impl View {
    /// Describes the view definition as catalog facts.
    ///
    /// Every call generates fresh action ids.
    pub fn changeset(&self) -> Diff {
        match self {
            View::Query(query) => query_changeset(query),
            View::Union(union) => union_changeset(union),
        }
    }
}

fn text(fact: &Fact, field: &str) -> String {
    fact.get(field).map(Value::to_string).unwrap_or_default()
}

fn by_action(action: &str) -> Fact {
    fact! { "action" => action }
}

/// Queues the removal of every catalog fact of a view.
pub fn remove_changeset<S: FactSource + ?Sized>(source: &mut S, view_id: &str) -> Diff {
    let by_view = fact! { "view" => view_id };
    let mut diff = Diff::new();
    for action in source.find(ACTION, Some(&by_view)) {
        let query = by_action(&text(&action, "action"));
        for table in [
            ACTION_SOURCE,
            ACTION_MAPPING,
            ACTION_MAPPING_CONSTANT,
            ACTION_MAPPING_SORTED,
            ACTION_MAPPING_LIMIT,
        ] {
            diff.remove(source, table, Some(&query));
        }
    }
    diff.remove(source, ACTION, Some(&by_view));
    diff.remove(source, VIEW, Some(&by_view));
    diff
}

fn action_source<S: FactSource + ?Sized>(source: &mut S, view_id: &str, action: &str) -> Result<String> {
    source
        .find(ACTION_SOURCE, Some(&by_action(action)))
        .first()
        .map(|fact| text(fact, "source view"))
        .ok_or_else(|| Error::invalid_view(view_id, format!("action {} has no source", action)))
}

/// `(from, binding)` pairs of an action, fields before constants, by name.
fn mapping_entries<S: FactSource + ?Sized>(source: &mut S, action: &str) -> Vec<(String, Binding)> {
    let query = by_action(action);
    let mut fields: Vec<(String, Binding)> = source
        .find(ACTION_MAPPING, Some(&query))
        .iter()
        .map(|m| {
            let binding = Binding::Field(FieldRef::new(text(m, "to source"), text(m, "to field")));
            (text(m, "from"), binding)
        })
        .collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    let mut constants: Vec<(String, Binding)> = source
        .find(ACTION_MAPPING_CONSTANT, Some(&query))
        .iter()
        .filter_map(|m| Some((text(m, "from"), Binding::Constant(m.get("value")?.clone()))))
        .collect();
    constants.sort_by(|a, b| a.0.cmp(&b.0));
    fields.extend(constants);
    fields
}

fn sort_keys<S: FactSource + ?Sized>(source: &mut S, view_id: &str, action: &str) -> Result<Vec<SortKey>> {
    let mut sorted = source.find(ACTION_MAPPING_SORTED, Some(&by_action(action)));
    if sorted.is_empty() {
        return Err(Error::invalid_view(view_id, format!("sort action {} has no fields", action)));
    }
    sorted.sort_by(|a, b| a.get("ix").cmp(&b.get("ix")));
    Ok(sorted
        .iter()
        .map(|m| SortKey {
            field: FieldRef::new(text(m, "source"), text(m, "field")),
            direction: Direction::parse(&text(m, "direction")),
        })
        .collect())
}

fn compile_query<S: FactSource + ?Sized>(source: &mut S, view_id: &str, actions: &[Rc<Fact>]) -> Result<Query> {
    let mut query = Query::new(view_id);
    for action in actions {
        let id = text(action, "action");
        let kind = text(action, "kind");
        query = match kind.as_str() {
            "select" => query.select_as(&action_source(source, view_id, &id)?, mapping_entries(source, &id), &id),
            "deselect" => query.deselect(&action_source(source, view_id, &id)?, mapping_entries(source, &id)),
            "calculate" => query.calculate_as(&action_source(source, view_id, &id)?, mapping_entries(source, &id), &id),
            "aggregate" => query.aggregate_as(&action_source(source, view_id, &id)?, mapping_entries(source, &id), &id),
            "sort" => query.sort(sort_keys(source, view_id, &id)?),
            "group" => query.group(sort_keys(source, view_id, &id)?.into_iter().map(|key| key.field)),
            "limit" => {
                let mut limit = Limit::default();
                for m in source.find(ACTION_MAPPING_LIMIT, Some(&by_action(&id))) {
                    let value = m.get("value").and_then(Value::as_f64).map(|v| v as usize);
                    match text(&m, "limit type").as_str() {
                        "results" => limit.results = value,
                        "perGroup" => limit.per_group = value,
                        "offset" => limit.offset = value,
                        _ => {}
                    }
                }
                query.limit(limit)
            }
            "ordinal" => query.ordinal(),
            "project" => query.project(mapping_entries(source, &id)),
            other => return Err(Error::invalid_view(view_id, format!("unknown query action kind {:?}", other))),
        };
    }
    Ok(query)
}

fn compile_union<S: FactSource + ?Sized>(source: &mut S, view_id: &str, actions: &[Rc<Fact>]) -> Result<Union> {
    let mut union = Union::new(view_id);
    for action in actions {
        let id = text(action, "action");
        let kind = text(action, "kind");
        if kind == "stateful" {
            union = union.stateful();
            continue;
        }
        let table = action_source(source, view_id, &id)?;
        let columns: Vec<(String, Column)> = mapping_entries(source, &id)
            .into_iter()
            .map(|(from, binding)| match binding {
                Binding::Field(FieldRef { field, .. }) => (from, column(field)),
                Binding::Constant(value) => (from, Column::Constant(value)),
            })
            .collect();
        union = match kind.as_str() {
            "union" => union.union(&table, columns),
            "ununion" => union.ununion(&table, columns),
            other => return Err(Error::invalid_view(view_id, format!("unknown union action kind {:?}", other))),
        };
    }
    Ok(union)
}

/// Rebuilds a view from its catalog facts, steps ordered by `ix`.
pub fn compile_view<S: FactSource + ?Sized>(source: &mut S, view_id: &str) -> Result<View> {
    let by_view = fact! { "view" => view_id };
    let view = source
        .find(VIEW, Some(&by_view))
        .into_iter()
        .next()
        .ok_or_else(|| Error::invalid_view(view_id, "not in the catalog"))?;
    let mut actions = source.find(ACTION, Some(&by_view));
    actions.sort_by(|a, b| a.get("ix").cmp(&b.get("ix")));

    match text(&view, "kind").as_str() {
        "query" => compile_query(source, view_id, &actions).map(View::Query),
        "union" => compile_union(source, view_id, &actions).map(View::Union),
        other => Err(Error::invalid_view(view_id, format!("unknown view kind {:?}", other))),
    }
}
