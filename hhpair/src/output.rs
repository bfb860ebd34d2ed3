use std::io::Write;

use serde::Serialize;
use strum::{Display, EnumCount, EnumIter, IntoEnumIterator};

use libhhpair::structs::{Alignment, Profile};

use crate::pipeline::PairResult;

/// The columns of the tabular output, in order.
#[derive(Clone, Copy, Debug, Display, EnumIter, EnumCount)]
#[strum(serialize_all = "snake_case")]
pub enum Field {
    Query,
    Template,
    Mode,
    Repeat,
    QueryStart,
    QueryEnd,
    TemplateStart,
    TemplateEnd,
    Cols,
    Score,
    SsScore,
    Evalue,
    Pvalue,
    Probability,
}

impl Field {
    fn value(&self, query: &Profile, template: &Profile, alignment: &Alignment) -> String {
        match self {
            Field::Query => query.name.clone(),
            Field::Template => template.name.clone(),
            Field::Mode => alignment.mode.to_string(),
            Field::Repeat => alignment.repeat_idx.to_string(),
            Field::QueryStart => alignment.query_start.to_string(),
            Field::QueryEnd => alignment.query_end.to_string(),
            Field::TemplateStart => alignment.template_start.to_string(),
            Field::TemplateEnd => alignment.template_end.to_string(),
            Field::Cols => alignment.matched_cols.to_string(),
            Field::Score => format!("{:.2}", alignment.score),
            Field::SsScore => format!("{:.2}", alignment.ss_score),
            Field::Evalue => format!("{:.2e}", alignment.e_value),
            Field::Pvalue => format!("{:.2e}", alignment.p_value),
            Field::Probability => format!("{:.1}", alignment.probability),
        }
    }
}

/// A reported alignment together with the names of its profiles.
struct Reported<'a> {
    query: &'a Profile,
    template: &'a Profile,
    alignment: &'a Alignment,
}

fn reported<'a>(
    results: &'a [PairResult],
    queries: &'a [Profile],
    templates: &'a [Profile],
    e_value_threshold: f64,
) -> Vec<Reported<'a>> {
    let mut reported: Vec<_> = results
        .iter()
        .flat_map(|result| {
            result.alignments.iter().map(move |alignment| Reported {
                query: &queries[result.query_idx],
                template: &templates[result.template_idx],
                alignment,
            })
        })
        .filter(|r| r.alignment.e_value <= e_value_threshold)
        .collect();

    reported.sort_by(|a, b| {
        a.query
            .name
            .cmp(&b.query.name)
            .then(a.alignment.e_value.total_cmp(&b.alignment.e_value))
            .then(a.template.name.cmp(&b.template.name))
            .then(a.alignment.repeat_idx.cmp(&b.alignment.repeat_idx))
    });
    reported
}

/// Writes one tab separated row per alignment that passes the E-value
/// threshold, best E-value first within each query.
pub fn write_table(
    out: &mut impl Write,
    results: &[PairResult],
    queries: &[Profile],
    templates: &[Profile],
    e_value_threshold: f64,
) -> anyhow::Result<usize> {
    let header: Vec<String> = Field::iter().map(|field| field.to_string()).collect();
    writeln!(out, "#{}", header.join("\t"))?;

    let rows = reported(results, queries, templates, e_value_threshold);
    for row in &rows {
        let mut values = Vec::with_capacity(Field::COUNT);
        for field in Field::iter() {
            values.push(field.value(row.query, row.template, row.alignment));
        }
        writeln!(out, "{}", values.join("\t"))?;
    }

    Ok(rows.len())
}

/// Writes the consensus display and the per-step dump of each reported
/// alignment.
pub fn write_alignments(
    out: &mut impl Write,
    results: &[PairResult],
    queries: &[Profile],
    templates: &[Profile],
    e_value_threshold: f64,
) -> anyhow::Result<()> {
    for row in reported(results, queries, templates, e_value_threshold) {
        let alignment = row.alignment;
        writeln!(
            out,
            ">> {} x {} (repeat {})",
            row.query.name, row.template.name, alignment.repeat_idx
        )?;

        let (query_line, match_line, template_line) =
            alignment.display_strings(row.query, row.template);
        let width = row.query.name.len().max(row.template.name.len());
        writeln!(
            out,
            "{:>width$} {:>5} {} {}",
            row.query.name, alignment.query_start, query_line, alignment.query_end
        )?;
        writeln!(out, "{:>width$} {:>5} {}", "", "", match_line)?;
        writeln!(
            out,
            "{:>width$} {:>5} {} {}",
            row.template.name, alignment.template_start, template_line, alignment.template_end
        )?;
        writeln!(out)?;

        alignment.dump(out)?;
        writeln!(out)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    query: &'a str,
    template: &'a str,
    #[serde(flatten)]
    alignment: &'a Alignment,
}

pub fn write_json(
    out: &mut impl Write,
    results: &[PairResult],
    queries: &[Profile],
    templates: &[Profile],
    e_value_threshold: f64,
) -> anyhow::Result<()> {
    let records: Vec<_> = reported(results, queries, templates, e_value_threshold)
        .into_iter()
        .map(|row| JsonRecord {
            query: &row.query.name,
            template: &row.template.name,
            alignment: row.alignment,
        })
        .collect();

    serde_json::to_writer_pretty(&mut *out, &records)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::AlignMode;
    use crate::io::read_profiles;
    use crate::io::test_files::profile_json;
    use crate::pipeline::{align_all, PairPlan};
    use libhhpair::AlignmentConfigBuilder;
    use serde_json::json;

    fn run() -> anyhow::Result<(Vec<Profile>, Vec<Profile>, Vec<PairResult>)> {
        let query_file = write_json_file(json!([profile_json("q", &[0, 1, 2, 3, 0, 1])]))?;
        let template_file = write_json_file(json!([
            profile_json("good", &[3, 0, 1, 2, 3, 0, 1, 2]),
            profile_json("poor", &[2, 2, 2, 2, 2]),
        ]))?;
        let queries = read_profiles(query_file.path())?;
        let templates = read_profiles(template_file.path())?;
        let config = AlignmentConfigBuilder::default().shift(0.5).build()?;
        let plan = PairPlan {
            mode: AlignMode::Viterbi,
            repeats: 1,
            samples: 0,
            seed: 0,
        };
        let results = align_all(&queries, &templates, &config, &plan);
        Ok((queries, templates, results))
    }

    fn write_json_file(value: serde_json::Value) -> anyhow::Result<tempfile::NamedTempFile> {
        crate::io::test_files::write_json(&value)
    }

    #[test]
    fn test_field_labels() {
        let labels: Vec<String> = Field::iter().map(|f| f.to_string()).collect();
        assert_eq!(labels.len(), Field::COUNT);
        assert_eq!(labels[0], "query");
        assert!(labels.contains(&"template_start".to_string()));
    }

    #[test]
    fn test_write_table() -> anyhow::Result<()> {
        let (queries, templates, results) = run()?;
        let mut out = vec![];
        let rows = write_table(&mut out, &results, &queries, &templates, f64::INFINITY)?;
        assert_eq!(rows, 2);

        let text = String::from_utf8(out)?;
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("#query\ttemplate"));
        assert!(lines[1].starts_with("q\tgood"));
        assert_eq!(lines[1].split('\t').count(), Field::COUNT);
        Ok(())
    }

    #[test]
    fn test_e_value_threshold_filters() -> anyhow::Result<()> {
        let (queries, templates, results) = run()?;
        let mut out = vec![];
        let rows = write_table(&mut out, &results, &queries, &templates, -1.0)?;
        assert_eq!(rows, 0);
        Ok(())
    }

    #[test]
    fn test_write_alignments_and_json() -> anyhow::Result<()> {
        let (queries, templates, results) = run()?;

        let mut out = vec![];
        write_alignments(&mut out, &results, &queries, &templates, f64::INFINITY)?;
        let text = String::from_utf8(out)?;
        assert!(text.contains(">> q x good (repeat 0)"));
        assert!(text.contains("viterbi alignment"));

        let mut out = vec![];
        write_json(&mut out, &results, &queries, &templates, f64::INFINITY)?;
        let records: serde_json::Value = serde_json::from_slice(&out)?;
        assert_eq!(records.as_array().map(|a| a.len()), Some(2));
        assert_eq!(records[0]["template"], "good");
        assert!(records[0]["steps"].is_array());
        Ok(())
    }
}
