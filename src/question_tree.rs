//! Rebuilds replicated questions into per-job trees of edit variants.
//!
//! Pure functions over already-fetched rows: group by job, link children to
//! parents, normalize the list columns, then flatten the roots. Nothing here
//! does I/O or can fail; malformed list columns fall back to best-effort shapes.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::{QuestionNode, QuestionOptions, QuestionRecord, StoredList};

/// Where a child's parent is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkScope {
    /// Parents are only found inside the child's own job. A variant produced by
    /// a different job than its original is dropped.
    #[default]
    Job,
    /// Parents are found anywhere in the fetched set; roots are still grouped
    /// by their own job.
    Global,
}

impl LinkScope {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "job" => Some(Self::Job),
            "global" => Some(Self::Global),
            _ => None,
        }
    }
}

/// Counters describing one reconstruction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TreeStats {
    pub rows: usize,
    pub jobs: usize,
    pub roots: usize,
    /// Rows whose parent could not be found in their lookup scope.
    pub orphans: usize,
    /// Rows that ended up nowhere in the output (orphans and their descendants).
    pub dropped: usize,
}

/// Rebuild question trees from flat rows.
pub fn reconstruct(rows: Vec<QuestionRecord>, scope: LinkScope) -> Vec<QuestionNode> {
    reconstruct_with_stats(rows, scope).0
}

/// Same as [`reconstruct`], also reporting how many rows were linked or dropped.
pub fn reconstruct_with_stats(
    rows: Vec<QuestionRecord>,
    scope: LinkScope,
) -> (Vec<QuestionNode>, TreeStats) {
    let mut stats = TreeStats {
        rows: rows.len(),
        ..Default::default()
    };

    // Partition by job, keeping first-encounter order of jobs.
    let mut job_order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<QuestionRecord>> = HashMap::new();
    for row in rows {
        let group = match groups.entry(row.job_id.clone()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                job_order.push(e.key().clone());
                e.insert(Vec::new())
            }
        };
        group.push(row);
    }
    stats.jobs = job_order.len();

    let roots = match scope {
        LinkScope::Job => {
            let mut roots = Vec::new();
            for job in &job_order {
                let group = groups.remove(job).unwrap_or_default();
                roots.extend(Forest::link(group).into_roots(&mut stats));
            }
            roots
        }
        LinkScope::Global => {
            let rank: HashMap<&str, usize> = job_order
                .iter()
                .enumerate()
                .map(|(i, job)| (job.as_str(), i))
                .collect();
            let all: Vec<QuestionRecord> = job_order
                .iter()
                .flat_map(|job| groups.remove(job).unwrap_or_default())
                .collect();
            let mut roots = Forest::link(all).into_roots(&mut stats);
            // Stable, so per-job input order survives.
            roots.sort_by_key(|node| rank.get(node.job_id.as_str()).copied().unwrap_or(usize::MAX));
            roots
        }
    };

    stats.roots = roots.len();
    let emitted: usize = roots.iter().map(count_nodes).sum();
    stats.dropped = stats.rows - emitted;

    (roots, stats)
}

/// Rows of one lookup scope with their parent links resolved.
struct Forest {
    slots: Vec<Option<QuestionRecord>>,
    children_of: HashMap<i64, Vec<usize>>,
    roots: Vec<usize>,
    orphans: usize,
}

impl Forest {
    fn link(rows: Vec<QuestionRecord>) -> Self {
        let ids: HashSet<i64> = rows.iter().map(|r| r.id).collect();
        let mut children_of: HashMap<i64, Vec<usize>> = HashMap::new();
        let mut roots = Vec::new();
        let mut orphans = 0;

        for (idx, row) in rows.iter().enumerate() {
            match row.parent_id {
                None => roots.push(idx),
                Some(parent) if ids.contains(&parent) => {
                    children_of.entry(parent).or_default().push(idx)
                }
                Some(_) => orphans += 1,
            }
        }

        Self {
            slots: rows.into_iter().map(Some).collect(),
            children_of,
            roots,
            orphans,
        }
    }

    fn into_roots(mut self, stats: &mut TreeStats) -> Vec<QuestionNode> {
        stats.orphans += self.orphans;
        let roots = std::mem::take(&mut self.roots);
        roots.into_iter().filter_map(|idx| self.build(idx)).collect()
    }

    /// Takes the row out of its slot, so each row is emitted at most once even
    /// if ids collide.
    fn build(&mut self, idx: usize) -> Option<QuestionNode> {
        let row = self.slots.get_mut(idx)?.take()?;
        let child_idxs = self.children_of.get(&row.id).cloned().unwrap_or_default();
        let children = child_idxs
            .into_iter()
            .filter_map(|child| self.build(child))
            .collect();
        Some(normalize(row, children))
    }
}

fn count_nodes(node: &QuestionNode) -> usize {
    1 + node.children.iter().map(count_nodes).sum::<usize>()
}

/// Turn a stored row into its served shape.
pub fn normalize(row: QuestionRecord, children: Vec<QuestionNode>) -> QuestionNode {
    QuestionNode {
        id: row.id,
        parent_id: row.parent_id,
        job_id: row.job_id,
        paper_id: row.paper_id,
        question_id: row.question_id,
        question: row.question,
        options: row.options.map(normalize_options),
        correct_ans: row.correct_ans,
        applied_edits: row.applied_edits.map(normalize_applied_edits),
        solution: row.solution,
        prompt: row.prompt,
        owner: row.owner,
        created_at: row.created_at,
        children,
    }
}

/// A JSON-array string becomes a list; any other string is kept raw. Other
/// JSON values are kept raw as their JSON text.
pub fn normalize_options(stored: StoredList) -> QuestionOptions {
    match stored {
        StoredList::List(items) => QuestionOptions::List(stringify_all(items)),
        StoredList::Other(value) => QuestionOptions::Raw(value.to_string()),
        StoredList::Text(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => QuestionOptions::List(stringify_all(items)),
            _ => QuestionOptions::Raw(raw),
        },
    }
}

/// A JSON-array string becomes a list; any other string is split on commas.
/// A lone non-string value becomes a one-element list.
pub fn normalize_applied_edits(stored: StoredList) -> Vec<String> {
    match stored {
        StoredList::List(items) => stringify_all(items),
        StoredList::Other(value) => stringify_all(vec![value]),
        StoredList::Text(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => stringify_all(items),
            _ => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        },
    }
}

fn stringify_all(items: Vec<Value>) -> Vec<String> {
    items
        .into_iter()
        .map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: i64, parent_id: Option<i64>, job_id: &str) -> QuestionRecord {
        QuestionRecord {
            id,
            parent_id,
            job_id: job_id.to_string(),
            paper_id: Some(json!("paper-1")),
            question_id: Some(json!(id * 100)),
            question: format!("Question {}", id),
            options: None,
            correct_ans: Some("A".to_string()),
            applied_edits: None,
            solution: None,
            prompt: None,
            owner: "user-1".to_string(),
            deleted: false,
            created_at: None,
        }
    }

    fn text(s: &str) -> Option<StoredList> {
        Some(StoredList::Text(s.to_string()))
    }

    fn ids(nodes: &[QuestionNode]) -> Vec<i64> {
        nodes.iter().map(|n| n.id).collect()
    }

    fn contains_id(nodes: &[QuestionNode], id: i64) -> bool {
        nodes
            .iter()
            .any(|n| n.id == id || contains_id(&n.children, id))
    }

    #[test]
    fn test_empty_input() {
        let (out, stats) = reconstruct_with_stats(Vec::new(), LinkScope::Job);
        assert!(out.is_empty());
        assert_eq!(stats, TreeStats::default());
    }

    #[test]
    fn test_scenario_with_orphan() {
        let mut r1 = row(1, None, "10");
        r1.options = text(r#"["A","B"]"#);
        let mut r2 = row(2, Some(1), "10");
        r2.options = Some(StoredList::List(vec![json!("C"), json!("D")]));
        r2.applied_edits = text(r#"["edit1"]"#);
        let mut r3 = row(3, Some(99), "10");
        r3.options = text("[]");

        let (out, stats) = reconstruct_with_stats(vec![r1, r2, r3], LinkScope::Job);

        assert_eq!(ids(&out), vec![1]);
        let root = &out[0];
        assert_eq!(
            root.options,
            Some(QuestionOptions::List(vec!["A".into(), "B".into()]))
        );
        assert_eq!(ids(&root.children), vec![2]);
        let child = &root.children[0];
        assert_eq!(
            child.options,
            Some(QuestionOptions::List(vec!["C".into(), "D".into()]))
        );
        assert_eq!(child.applied_edits, Some(vec!["edit1".to_string()]));
        assert!(!contains_id(&out, 3));
        assert_eq!(stats.orphans, 1);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn test_every_root_appears_once() {
        let rows = vec![
            row(5, None, "2"),
            row(1, None, "1"),
            row(6, Some(5), "2"),
            row(2, None, "1"),
        ];
        let out = reconstruct(rows, LinkScope::Job);

        // Job order follows first encounter; roots keep input order per job.
        assert_eq!(ids(&out), vec![5, 1, 2]);
        assert!(out.iter().all(|n| n.parent_id.is_none()));
    }

    #[test]
    fn test_deep_chain_nests() {
        let rows = vec![
            row(4, Some(3), "7"),
            row(3, Some(2), "7"),
            row(2, Some(1), "7"),
            row(1, None, "7"),
        ];
        let out = reconstruct(rows, LinkScope::Job);

        assert_eq!(ids(&out), vec![1]);
        let depth2 = &out[0].children[0];
        let depth3 = &depth2.children[0];
        assert_eq!(depth2.id, 2);
        assert_eq!(depth3.id, 3);
        assert_eq!(ids(&depth3.children), vec![4]);
    }

    #[test]
    fn test_children_keep_input_order() {
        let rows = vec![
            row(1, None, "7"),
            row(9, Some(1), "7"),
            row(3, Some(1), "7"),
            row(5, Some(1), "7"),
        ];
        let out = reconstruct(rows, LinkScope::Job);
        assert_eq!(ids(&out[0].children), vec![9, 3, 5]);
    }

    #[test]
    fn test_order_insensitive_content() {
        let forward = vec![
            row(1, None, "a"),
            row(2, Some(1), "a"),
            row(3, Some(1), "a"),
            row(4, None, "b"),
        ];
        let mut backward = forward.clone();
        backward.reverse();

        let collect = |nodes: Vec<QuestionNode>| {
            let mut pairs: Vec<(i64, Vec<i64>)> = nodes
                .iter()
                .map(|n| {
                    let mut kids = ids(&n.children);
                    kids.sort();
                    (n.id, kids)
                })
                .collect();
            pairs.sort();
            pairs
        };

        assert_eq!(
            collect(reconstruct(forward, LinkScope::Job)),
            collect(reconstruct(backward, LinkScope::Job))
        );
    }

    #[test]
    fn test_cross_job_child_dropped_in_job_scope() {
        let rows = vec![row(1, None, "10"), row(2, Some(1), "11")];
        let (out, stats) = reconstruct_with_stats(rows, LinkScope::Job);

        assert_eq!(ids(&out), vec![1]);
        assert!(out[0].children.is_empty());
        assert!(!contains_id(&out, 2));
        assert_eq!(stats.jobs, 2);
        assert_eq!(stats.orphans, 1);
    }

    #[test]
    fn test_cross_job_child_attached_in_global_scope() {
        let rows = vec![
            row(2, Some(1), "11"),
            row(3, None, "11"),
            row(1, None, "10"),
            row(4, Some(99), "10"),
        ];
        let (out, stats) = reconstruct_with_stats(rows, LinkScope::Global);

        // Job "11" was encountered first, so its roots lead.
        assert_eq!(ids(&out), vec![3, 1]);
        assert_eq!(ids(&out[1].children), vec![2]);
        assert!(!contains_id(&out, 4));
        assert_eq!(stats.orphans, 1);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn test_descendants_of_orphans_are_dropped() {
        let rows = vec![row(1, None, "1"), row(2, Some(50), "1"), row(3, Some(2), "1")];
        let (out, stats) = reconstruct_with_stats(rows, LinkScope::Job);

        assert_eq!(ids(&out), vec![1]);
        assert_eq!(stats.orphans, 1);
        assert_eq!(stats.dropped, 2);
    }

    #[test]
    fn test_cycle_without_root_is_unreachable() {
        let rows = vec![row(1, Some(2), "1"), row(2, Some(1), "1"), row(3, None, "1")];
        let (out, stats) = reconstruct_with_stats(rows, LinkScope::Job);

        assert_eq!(ids(&out), vec![3]);
        assert_eq!(stats.orphans, 0);
        assert_eq!(stats.dropped, 2);
    }

    #[test]
    fn test_normalize_options() {
        assert_eq!(
            normalize_options(StoredList::Text(r#"["A","B"]"#.into())),
            QuestionOptions::List(vec!["A".into(), "B".into()])
        );
        assert_eq!(
            normalize_options(StoredList::List(vec![json!("A"), json!("B")])),
            QuestionOptions::List(vec!["A".into(), "B".into()])
        );
        assert_eq!(
            normalize_options(StoredList::Text("not json".into())),
            QuestionOptions::Raw("not json".into())
        );
        // Valid JSON that is not an array stays raw.
        assert_eq!(
            normalize_options(StoredList::Text(r#"{"a":1}"#.into())),
            QuestionOptions::Raw(r#"{"a":1}"#.into())
        );
    }

    #[test]
    fn test_normalize_applied_edits() {
        assert_eq!(
            normalize_applied_edits(StoredList::Text(r#"["fix typo","reworded"]"#.into())),
            vec!["fix typo", "reworded"]
        );
        assert_eq!(
            normalize_applied_edits(StoredList::Text("fix typo, reworded".into())),
            vec!["fix typo", "reworded"]
        );
        assert_eq!(
            normalize_applied_edits(StoredList::Text(" a,, ,b ,".into())),
            vec!["a", "b"]
        );
        assert_eq!(
            normalize_applied_edits(StoredList::Text("[1, true]".into())),
            vec!["1", "true"]
        );
        assert!(normalize_applied_edits(StoredList::Text(String::new())).is_empty());
    }

    #[test]
    fn test_other_json_values_normalize() {
        assert_eq!(
            normalize_options(StoredList::Other(json!({"a": "x"}))),
            QuestionOptions::Raw(r#"{"a":"x"}"#.into())
        );
        assert_eq!(
            normalize_applied_edits(StoredList::Other(json!(3))),
            vec!["3"]
        );
    }

    #[test]
    fn test_duplicate_ids_emit_each_row_once() {
        let rows = vec![row(1, None, "1"), row(1, None, "1"), row(2, Some(1), "1")];
        let (out, stats) = reconstruct_with_stats(rows, LinkScope::Job);

        assert_eq!(ids(&out), vec![1, 1]);
        assert_eq!(ids(&out[0].children), vec![2]);
        assert!(out[1].children.is_empty());
        assert_eq!(stats.dropped, 0);
    }

    #[test]
    fn test_null_applied_edits_stays_null() {
        let out = reconstruct(vec![row(1, None, "1")], LinkScope::Job);
        assert_eq!(out[0].applied_edits, None);
        assert_eq!(out[0].options, None);
    }

    #[test]
    fn test_link_scope_parse() {
        assert_eq!(LinkScope::parse("job"), Some(LinkScope::Job));
        assert_eq!(LinkScope::parse(" Global "), Some(LinkScope::Global));
        assert_eq!(LinkScope::parse("tree"), None);
    }
}
