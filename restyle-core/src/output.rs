//! Per-step output rows and their TSV and JSON Lines writers.

use serde::Serialize;
use std::io::{self, Write};

use crate::engine::GenerationTask;
use crate::store::{AlignmentKind, Seen};

/// One generated step alongside what produced it and what it is compared to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRow {
    pub recipe_id: String,
    /// Source step the generated step rewrites.
    pub step_index: usize,
    pub reference_step_index: Option<usize>,
    pub step_prompt: String,
    pub ingredient_prompt: String,
    pub original_step: String,
    pub generated: String,
    pub candidates: Vec<String>,
    pub mentions: String,
    pub reference_step: String,
    pub alignment: Option<AlignmentKind>,
    pub seen: Option<Seen>,
}

/// Rows for every step a task generated, in order.
pub fn rows_from_task(task: &GenerationTask) -> Vec<OutputRow> {
    task.generated_steps
        .iter()
        .enumerate()
        .map(|(i, generated)| {
            let step_index = task.start_step + i;
            let reference = task.alignment.reference_for(step_index);
            let reference_step = reference
                .and_then(|(idx, _)| task.target.as_ref()?.steps.get(idx).cloned())
                .unwrap_or_default();
            let at = |records: &[String]| records.get(i).cloned().unwrap_or_default();

            OutputRow {
                recipe_id: task.id.clone(),
                step_index,
                reference_step_index: reference.map(|(idx, _)| idx),
                step_prompt: at(&task.step_prompts),
                ingredient_prompt: at(&task.ingredient_prompts),
                original_step: task.source.steps.get(step_index).cloned().unwrap_or_default(),
                generated: generated.clone(),
                candidates: task.candidates.get(i).cloned().unwrap_or_default(),
                mentions: at(&task.generated_mentions),
                reference_step,
                alignment: reference.map(|(_, kind)| kind),
                seen: task.seen,
            }
        })
        .collect()
}

/// Tabs and line breaks would break the row layout.
fn cell(text: &str) -> String {
    text.replace(['\t', '\n', '\r'], " ")
}

/// Write rows as tab-separated values with a header.
///
/// With `all_candidates` the single `generated` column becomes
/// `generated0..generatedN`, one per sampled candidate.
pub fn write_tsv<W: Write>(mut out: W, rows: &[OutputRow], all_candidates: bool) -> io::Result<()> {
    let width = rows.iter().map(|r| r.candidates.len()).max().unwrap_or(0).max(1);

    let mut header = vec![
        "recipe_id".to_string(),
        "step_id".to_string(),
        "context".to_string(),
        "ingredient_context".to_string(),
        "original".to_string(),
    ];
    if all_candidates {
        header.extend((0..width).map(|i| format!("generated{}", i)));
    } else {
        header.push("generated".to_string());
    }
    header.extend(
        ["mentions", "reference", "reference_step_id", "seen_unseen", "aligned_uniform"]
            .map(String::from),
    );
    writeln!(out, "{}", header.join("\t"))?;

    for row in rows {
        let mut cells = vec![
            cell(&row.recipe_id),
            row.step_index.to_string(),
            cell(&row.step_prompt),
            cell(&row.ingredient_prompt),
            cell(&row.original_step),
        ];
        if all_candidates {
            cells.extend((0..width).map(|i| row.candidates.get(i).map(|c| cell(c)).unwrap_or_default()));
        } else {
            cells.push(cell(&row.generated));
        }
        cells.push(cell(&row.mentions));
        cells.push(cell(&row.reference_step));
        cells.push(row.reference_step_index.map(|i| i.to_string()).unwrap_or_default());
        cells.push(row.seen.map(|s| s.as_str().to_string()).unwrap_or_default());
        cells.push(row.alignment.map(|a| a.as_str().to_string()).unwrap_or_default());
        writeln!(out, "{}", cells.join("\t"))?;
    }
    Ok(())
}

/// Write one JSON object per row.
pub fn write_jsonl<W: Write>(mut out: W, rows: &[OutputRow]) -> io::Result<()> {
    for row in rows {
        serde_json::to_writer(&mut out, row)?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TaskFactory;
    use crate::mode::Mode;
    use crate::store::{RecipePair, StepAlignment};
    use crate::types::Recipe;

    fn finished_task() -> GenerationTask {
        let pair = RecipePair {
            source_id: "r1".to_string(),
            target_id: "r2".to_string(),
            source_tag: "non-vegan".parse().unwrap(),
            target_tag: "vegan".parse().unwrap(),
            seen: Seen::Seen,
            alignments: vec![StepAlignment {
                source_step: 1,
                target_step: 2,
                probability: 0.9,
            }],
        };
        let source = Recipe::new("Omelet", ["2 eggs"], ["Whisk the eggs.", "Cook\tthe eggs."]);
        let target = Recipe::new("Scramble", ["tofu"], ["Crumble tofu.", "Season.", "Cook the tofu."]);
        let mut task = TaskFactory::new(Mode::StyleTransfer { simple: false })
            .tasks_for_pair(&pair, &source, Some(&target))
            .unwrap()
            .remove(0);
        task.push_step("Crumble tofu.", "", vec!["Crumble tofu.".into(), "Whisk.".into()], "p0", "");
        task.push_step("Cook the tofu.", "", vec!["Cook the tofu.".into()], "p1", "");
        task.finalize();
        task
    }

    #[test]
    fn test_rows_follow_alignment() {
        let rows = rows_from_task(&finished_task());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].alignment, Some(AlignmentKind::Uniform));
        assert_eq!(rows[0].reference_step_index, Some(0));
        assert_eq!(rows[1].alignment, Some(AlignmentKind::Aligned));
        assert_eq!(rows[1].reference_step, "Cook the tofu.");
        assert_eq!(rows[1].original_step, "Cook\tthe eggs.");
        assert_eq!(rows[1].step_prompt, "p1");
    }

    #[test]
    fn test_tsv_layout() {
        let rows = rows_from_task(&finished_task());
        let mut buf = Vec::new();
        write_tsv(&mut buf, &rows, true).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "recipe_id\tstep_id\tcontext\tingredient_context\toriginal\tgenerated0\tgenerated1\tmentions\treference\treference_step_id\tseen_unseen\taligned_uniform"
        );
        let second: Vec<&str> = lines[2].split('\t').collect();
        assert_eq!(second.len(), 12);
        assert_eq!(second[4], "Cook the eggs.");
        assert_eq!(second[6], "");
        assert_eq!(&second[9..], &["2", "seen", "aligned"]);
    }

    #[test]
    fn test_jsonl_file() {
        let rows = rows_from_task(&finished_task());
        let file = tempfile::NamedTempFile::new().unwrap();
        write_jsonl(file.as_file(), &rows).unwrap();

        let text = std::fs::read_to_string(file.path()).unwrap();
        let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(first["recipe_id"], "r1-vegan0");
        assert_eq!(first["alignment"], "uniform");
        assert_eq!(first["seen"], "seen");
    }
}
