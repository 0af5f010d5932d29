//! Integration tests for the response-group analysis pipeline, from CSV
//! ingestion through the corrected result table.

use approx::assert_relative_eq;
use cyto_daa::prelude::*;
use std::collections::HashMap;
use std::io::Write;
use tempfile::NamedTempFile;

/// Write a synthetic wide cell-count CSV with known group effects.
///
/// 10 subjects (5 responders, 5 non-responders), 2 timepoints each. The
/// b_cell fraction is strongly elevated in responders; the remaining
/// populations absorb the difference, with cd8_t_cell depressed and the
/// others roughly stable.
fn create_synthetic_csv() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "project,subject,condition,age,sex,treatment,response,sample,sample_type,time_from_treatment_start,b_cell,cd8_t_cell,cd4_t_cell,nk_cell,monocyte"
    )
    .unwrap();

    let mut rng_seed = 7u64;
    let mut jitter = |scale: i64| -> i64 {
        rng_seed = rng_seed.wrapping_mul(1103515245).wrapping_add(12345);
        (((rng_seed >> 16) & 0x7FFF) as i64 % (2 * scale + 1)) - scale
    };

    let mut sample = 0;
    for subj in 0..10u32 {
        let responder = subj < 5;
        let response = if responder { "yes" } else { "no" };
        let sex = if subj % 2 == 0 { "F" } else { "M" };
        let project = if subj < 7 { "prj1" } else { "prj2" };
        for time in [0, 7] {
            sample += 1;
            let b_cell = if responder { 3500 + jitter(150) } else { 1200 + jitter(150) };
            let cd8 = if responder { 1500 + jitter(100) } else { 3000 + jitter(100) };
            let cd4 = 2500 + jitter(100);
            let nk = 1500 + jitter(80);
            let mono = 1000 + jitter(80);
            writeln!(
                file,
                "{},sbj{},melanoma,{},{},tr1,{},s{},PBMC,{},{},{},{},{},{}",
                project,
                subj,
                45 + subj,
                sex,
                response,
                sample,
                time,
                b_cell,
                cd8,
                cd4,
                nk,
                mono,
            )
            .unwrap();
        }
    }
    file.flush().unwrap();
    file
}

#[test]
fn test_csv_to_frequencies_sums_to_one() {
    let file = create_synthetic_csv();
    let records = CellCountRecord::from_csv(file.path()).unwrap();
    assert_eq!(records.len(), 20 * 5);

    let table = derive_frequencies(&records);
    assert_eq!(table.n_excluded_samples, 0);

    let mut sums: HashMap<String, f64> = HashMap::new();
    for r in &table.records {
        *sums.entry(r.base.sample.clone()).or_insert(0.0) += r.proportion;
    }
    assert_eq!(sums.len(), 20);
    for sum in sums.values() {
        assert_relative_eq!(*sum, 1.0, epsilon = 1e-9);
    }
}

#[test]
fn test_full_analysis_finds_separated_population() {
    let file = create_synthetic_csv();
    let records = CellCountRecord::from_csv(file.path()).unwrap();

    let report = run_analysis(&records, &FilterSet::new(), &AnalysisConfig::default()).unwrap();

    // All five reference populations get a result row
    assert_eq!(report.results.len(), 5);
    assert_eq!(report.cohort.n_subjects, 10);
    assert_eq!(report.cohort.n_samples, 20);
    assert_eq!(report.cohort.baseline_subjects, 10);

    let by_population: HashMap<&str, &CorrectedModelResult> = report
        .results
        .iter()
        .map(|r| (r.model.population.as_str(), r))
        .collect();

    let b_cell = by_population["b_cell"];
    assert_eq!(b_cell.model.status, FitStatus::Converged);
    assert_eq!(b_cell.significance, Significance::Significant);
    assert!(b_cell.model.estimate > 0.0, "responders have more b cells");

    let cd8 = by_population["cd8_t_cell"];
    assert!(cd8.model.estimate < 0.0, "responders have fewer cd8 t cells");

    // Ranked output: adjusted p-values non-decreasing over tested rows
    let mut prev = 0.0;
    for r in report.results.iter().filter(|r| r.tested()) {
        let q = r.p_adj.unwrap();
        assert!(q >= prev - 1e-12);
        assert!((0.0..=1.0).contains(&q));
        prev = q;
    }
}

#[test]
fn test_filtering_narrows_cohort_monotonically() {
    let file = create_synthetic_csv();
    let records = CellCountRecord::from_csv(file.path()).unwrap();
    let table = derive_frequencies(&records);

    let all = cohort_size(&table.records, 0.0);
    let prj1 = cohort_size(
        &apply_filters(&table.records, &FilterSet::new().projects(["prj1"])),
        0.0,
    );
    let prj1_female = cohort_size(
        &apply_filters(
            &table.records,
            &FilterSet::new().projects(["prj1"]).sexes(["F"]),
        ),
        0.0,
    );

    assert_eq!(all, 10);
    assert_eq!(prj1, 7);
    assert_eq!(prj1_female, 4);
}

#[test]
fn test_baseline_only_analysis() {
    let file = create_synthetic_csv();
    let records = CellCountRecord::from_csv(file.path()).unwrap();

    let filters = FilterSet::new().time_range(0.0, 0.0);
    let report = run_analysis(&records, &filters, &AnalysisConfig::default()).unwrap();

    // One sample per subject at baseline
    assert_eq!(report.cohort.n_samples, 10);
    assert_eq!(report.cohort.n_subjects, 10);

    let b_cell = report
        .results
        .iter()
        .find(|r| r.model.population == "b_cell")
        .unwrap();
    assert!(b_cell.tested());
    assert!(b_cell.model.estimate > 0.0);
}

#[test]
fn test_report_tsv_has_three_states() {
    let file = create_synthetic_csv();
    let records = CellCountRecord::from_csv(file.path()).unwrap();
    let report = run_analysis(&records, &FilterSet::new(), &AnalysisConfig::default()).unwrap();

    let out = NamedTempFile::new().unwrap();
    report.write_tsv(out.path()).unwrap();

    let content = std::fs::read_to_string(out.path()).unwrap();
    let mut lines = content.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("population\t"));
    assert!(header.contains("significance"));
    assert_eq!(lines.count(), report.results.len());
    // Every row carries one of the three distinct states
    for line in content.lines().skip(1) {
        assert!(
            line.contains("significant") || line.contains("not_tested"),
            "unexpected significance label in {}",
            line
        );
    }
}
