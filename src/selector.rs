//! Query engine: index selection, per-level range pruning, residual
//! predicate evaluation, shell-sort, skip/limit, and optional delete.

use std::{cmp::Ordering as CmpOrdering, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    hash::{self, degree_and_residual, md5_digest16},
    index::{Index, KeyStructure},
    link::Link,
    node::Node,
    storage::Storage,
    value::Value,
    Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    Gt,
    Lt,
    Eq,
    Dif,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub param: String,
    pub op: Op,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortSpec {
    pub param: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Selector {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub skip: u64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub sort: Option<SortSpec>,
    #[serde(default)]
    pub delete_mode: bool,
}

const DEFAULT_LIMIT: u64 = 1000;

struct IndexCondition {
    op: Op,
    hash_key: u64,
    digest: String,
    degrees: [u16; 4],
}

fn key_structure_matches(ks: &KeyStructure, param: &str) -> bool {
    match ks {
        KeyStructure::Path(p) => p == param,
        KeyStructure::PutKey => param == "key",
        KeyStructure::AutoIncrement => param == "id",
    }
}

fn decompose(hash_key: u64) -> [u16; 4] {
    let mut residual = hash_key;
    let mut degrees = [0u16; 4];
    for level in 1..=4u8 {
        let (d, r) = degree_and_residual(level, residual);
        degrees[(level - 1) as usize] = d;
        residual = r;
    }
    degrees
}

fn select_index<'a>(indexes: &'a [Arc<Index>], selector: &Selector) -> &'a Arc<Index> {
    let condition_matches: Vec<&Arc<Index>> = indexes
        .iter()
        .filter(|idx| {
            selector
                .conditions
                .iter()
                .any(|c| key_structure_matches(idx.key_structure(), &c.param))
        })
        .collect();

    if let Some(sort) = &selector.sort {
        if let Some(idx) = condition_matches
            .iter()
            .find(|idx| key_structure_matches(idx.key_structure(), &sort.param))
        {
            return idx;
        }
    }
    if let Some(idx) = condition_matches.first() {
        return idx;
    }
    if let Some(sort) = &selector.sort {
        if let Some(idx) = indexes.iter().find(|idx| key_structure_matches(idx.key_structure(), &sort.param)) {
            return idx;
        }
    }
    &indexes[0]
}

fn inner_keep(cond: &IndexCondition, level: u8, child_degree: u16) -> bool {
    let cond_degree = cond.degrees[(level - 1) as usize];
    match cond.op {
        Op::Gt => child_degree >= cond_degree,
        Op::Lt => child_degree <= cond_degree,
        Op::Eq => child_degree == cond_degree,
        Op::Dif => true,
    }
}

fn leaf_keep(cond: &IndexCondition, link: &Link) -> bool {
    match cond.op {
        Op::Gt => link.hash_key() > cond.hash_key,
        Op::Lt => link.hash_key() < cond.hash_key,
        Op::Eq => link.digest() == cond.digest,
        Op::Dif => link.digest() != cond.digest,
    }
}

fn collect(node: &Node, index_conditions: &[IndexCondition], ascending: bool, out: &mut Vec<Arc<Link>>) {
    if node.is_leaf() {
        for link in node.links_sorted() {
            if index_conditions.iter().all(|c| leaf_keep(c, &link)) {
                out.push(link);
            }
        }
        return;
    }
    let mut children = node.children_sorted();
    if !ascending {
        children.reverse();
    }
    for child in children {
        let level = node.level();
        if index_conditions.iter().all(|c| inner_keep(c, level, child.degree_index())) {
            collect(&child, index_conditions, ascending, out);
        }
    }
}

fn value_for_compare(v: &Value) -> String {
    match v {
        Value::Str(s) => s.clone(),
        Value::Int(i) => i.to_string(),
        Value::Uint(u) => u.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn compare_values(field: &Value, cond: &Value) -> Option<CmpOrdering> {
    use Value::*;
    match (field, cond) {
        (Int(a), Int(b)) => a.partial_cmp(b),
        (Uint(a), Uint(b)) => a.partial_cmp(b),
        (Float(a), Float(b)) => a.partial_cmp(b),
        (Int(a), Uint(b)) => (*a as i128).partial_cmp(&(*b as i128)),
        (Uint(a), Int(b)) => (*a as i128).partial_cmp(&(*b as i128)),
        (Int(a), Float(b)) => (*a as f64).partial_cmp(b),
        (Float(a), Int(b)) => a.partial_cmp(&(*b as f64)),
        (Uint(a), Float(b)) => (*a as f64).partial_cmp(b),
        (Float(a), Uint(b)) => a.partial_cmp(&(*b as f64)),
        (Str(a), Str(b)) => a.partial_cmp(b),
        (Bool(a), Bool(b)) => a.partial_cmp(b),
        _ => value_for_compare(field).partial_cmp(&value_for_compare(cond)),
    }
}

fn residual_holds(value: &Value, cond: &Condition) -> bool {
    let field = match value.get_path(&cond.param) {
        Some(v) => v,
        None => return false,
    };
    let ordering = match compare_values(field, &cond.value) {
        Some(o) => o,
        None => return false,
    };
    match cond.op {
        Op::Gt => ordering == CmpOrdering::Greater,
        Op::Lt => ordering == CmpOrdering::Less,
        Op::Eq => ordering == CmpOrdering::Equal,
        Op::Dif => ordering != CmpOrdering::Equal,
    }
}

fn sort_projection(value: &Value, path: &str) -> u64 {
    match value.get_path(path).and_then(|v| hash::type_to_index(v).ok()) {
        Some((_, hash_key)) => hash_key,
        None => u64::MAX,
    }
}

/// In-place shell sort, matching the original's choice for the
/// rarely-exercised "sort by a non-index field" path.
fn shell_sort(values: &mut [Value], path: &str, ascending: bool) {
    let n = values.len();
    if n < 2 {
        return;
    }
    let mut keys: Vec<u64> = values.iter().map(|v| sort_projection(v, path)).collect();
    let mut gap = n / 2;
    while gap > 0 {
        for i in gap..n {
            let key_i = keys[i];
            let val_i = values[i].clone();
            let mut j = i;
            while j >= gap {
                let out_of_order = if ascending {
                    keys[j - gap] > key_i
                } else {
                    keys[j - gap] < key_i
                };
                if !out_of_order {
                    break;
                }
                keys[j] = keys[j - gap];
                values[j] = values[j - gap].clone();
                j -= gap;
            }
            keys[j] = key_i;
            values[j] = val_i;
        }
        gap /= 2;
    }
}

impl Selector {
    /// Run this selector against `indexes`, fetching matching values through
    /// `storage`. Returns the surviving values in result order; `count`
    /// always equals `values.len()`.
    pub fn run(
        &self,
        indexes: &[Arc<Index>],
        storage: &Storage,
        db_id: &str,
        form_id: &str,
    ) -> Result<(u64, Vec<Value>)> {
        if indexes.is_empty() {
            return err_at!(FormNotFound, msg: "form has no indexes to select against");
        }
        let chosen = select_index(indexes, self);
        log::debug!("select: chose index {:?} ({:?})", chosen.id(), chosen.key_structure());
        let ascending = self.sort.as_ref().map(|s| s.ascending).unwrap_or(true);

        let mut index_conditions = Vec::new();
        let mut residual_conditions = Vec::new();
        for cond in &self.conditions {
            if key_structure_matches(chosen.key_structure(), &cond.param) {
                let (key_string, hash_key) = hash::type_to_index(&cond.value)?;
                let digest = md5_digest16(key_string.as_bytes());
                index_conditions.push(IndexCondition {
                    op: cond.op,
                    hash_key,
                    digest,
                    degrees: decompose(hash_key),
                });
            } else {
                residual_conditions.push(cond);
            }
        }

        let mut candidates = Vec::new();
        collect(chosen.root(), &index_conditions, ascending, &mut candidates);
        log::debug!(
            "select: pruned to {} candidate link(s) with {} residual condition(s)",
            candidates.len(),
            residual_conditions.len()
        );

        let limit = if self.limit == 0 { DEFAULT_LIMIT } else { self.limit };
        let mut results = Vec::new();
        let mut skipped = 0u64;

        for link in candidates {
            if results.len() as u64 >= limit {
                break;
            }
            let extent = link.extent();
            if !link.is_flushed() {
                continue;
            }
            let value = storage.take(db_id, form_id, extent.seek_start, extent.seek_last)?;
            if !residual_conditions.iter().all(|c| residual_holds(&value, c)) {
                continue;
            }
            if skipped < self.skip {
                skipped += 1;
                continue;
            }
            if self.delete_mode {
                chosen.remove_link(&link);
            }
            results.push(value);
        }

        if let Some(sort) = &self.sort {
            if !key_structure_matches(chosen.key_structure(), &sort.param) {
                shell_sort(&mut results, &sort.param, sort.ascending);
            }
        }

        let count = results.len() as u64;
        Ok((count, results))
    }
}

#[cfg(test)]
#[path = "selector_test.rs"]
mod selector_test;
