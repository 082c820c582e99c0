use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use assert_matches::assert_matches;
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;

use kira_metadata_fetcher::combine::{COMBINED_COLUMNS, combine};
use kira_metadata_fetcher::error::KiraError;
use kira_metadata_fetcher::merge::{EnaMergeOptions, merge_ena};
use kira_metadata_fetcher::slim::{SlimFilter, slim_ena, slim_sra};

const SRA_MERGED: &str = "\
Run,BioProject,spots,spots_with_mates,LibraryStrategy,LibrarySelection,LibrarySource,LibraryLayout,Platform,Model,ScientificName
SRR1,PRJNA1,250000,250000,WGS,RANDOM,METAGENOMIC,PAIRED,ILLUMINA,Illumina NovaSeq 6000,Homo sapiens
SRR2,PRJNA1,90000,0,WGS,RANDOM,METAGENOMIC,SINGLE,ILLUMINA,,Homo sapiens
SRR3,PRJNA2,500000,0,AMPLICON,PCR,METAGENOMIC,SINGLE,ILLUMINA,,Homo sapiens
SRR4,PRJNA2,500000,0,WGS,RANDOM,GENOMIC,SINGLE,ILLUMINA,,Homo sapiens
SRR5,,500000,0,WGS,RANDOM,METAGENOMIC,SINGLE,ILLUMINA,,Homo sapiens
SRR6,PRJNA3,1.2e6,0,wgs,random,metagenomic,SINGLE,ILLUMINA,,homo sapiens
SRR7,PRJNA3,500000,0,WGS,RANDOM,METAGENOMIC,SINGLE,ILLUMINA,,Mus musculus
";

const ENA_MERGED: &str = "\
query_id\tstudy_accession\trun_accession\tread_count\tlibrary_strategy\tlibrary_source\tlibrary_selection\tlibrary_layout\tinstrument_platform\tinstrument_model\tscientific_name\ttax_id
gut\tPRJEB1\tERR1\t300000\tWGS\tMETAGENOMIC\tRANDOM\tPAIRED\tILLUMINA\tIllumina HiSeq 2500\tHomo sapiens\t9606
gut\tPRJEB1\tERR2\t300000\tWGA\tMETAGENOMIC\tRANDOM\tPAIRED\tILLUMINA\t\tHomo sapiens\t9606
gut\tPRJEB1\tERR3\t300000\tWGS\tMETAGENOMIC\tPCR\tSINGLE\tILLUMINA\t\tHomo sapiens\t9606
gut\tPRJEB2\tERR4\t10\tWGS\tMETAGENOMIC\tRANDOM\tSINGLE\tILLUMINA\t\tHomo sapiens\t9606
gut\tPRJEB2\tSRR1\t400000\tWGS\tMETAGENOMIC\tRANDOM\tSINGLE\tILLUMINA\t\tHomo sapiens\t9606
gut\tPRJEB2\tERR5\t400000\tWGS\tMETAGENOMIC\tRANDOM\tSINGLE\tILLUMINA\t\tHomo sapiens\t9606
";

fn gzip(path: &Path, content: &str) {
    let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    encoder.write_all(content.as_bytes()).unwrap();
    encoder.finish().unwrap();
}

fn gunzip(path: &Path) -> String {
    let mut text = String::new();
    MultiGzDecoder::new(File::open(path).unwrap())
        .read_to_string(&mut text)
        .unwrap();
    text
}

#[test]
fn slim_sra_filters_and_reshapes() {
    let temp = tempfile::tempdir().unwrap();
    let input = temp.path().join("sra_merged_runs.csv");
    fs::write(&input, SRA_MERGED).unwrap();
    let output = temp.path().join("sra_slim.csv");

    let summary = slim_sra(&input, &output, &SlimFilter::default()).unwrap();

    assert_eq!(summary.rows_in, 7);
    assert_eq!(summary.rows_out, 2);
    assert_eq!(summary.skipped.low_reads, 1);
    assert_eq!(summary.skipped.strategy, 1);
    assert_eq!(summary.skipped.source, 1);
    assert_eq!(summary.skipped.missing_accession, 1);
    assert_eq!(summary.skipped.scientific_name, 1);
    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "BioProject,Run,spots,spots_with_mates,SeqType,SequencingMachine,ScientificName,LibraryStrategy,LibrarySource\n\
         PRJNA1,SRR1,250000,250000,paired,Illumina NovaSeq 6000,Homo sapiens,WGS/RANDOM,METAGENOMIC\n\
         PRJNA3,SRR6,1.2e6,0,single,ILLUMINA,homo sapiens,wgs/random,metagenomic\n"
    );
}

#[test]
fn slim_ena_reads_and_writes_gzip() {
    let temp = tempfile::tempdir().unwrap();
    let input = temp.path().join("merged_runs.tsv.gz");
    gzip(&input, ENA_MERGED);
    let output = temp.path().join("out").join("ena_slim.tsv.gz");

    let summary = slim_ena(&input, &output, &SlimFilter::default()).unwrap();

    assert_eq!(summary.rows_in, 6);
    assert_eq!(summary.rows_out, 3);
    assert_eq!(summary.skipped.strategy, 1);
    assert_eq!(summary.skipped.selection, 1);
    assert_eq!(summary.skipped.low_reads, 1);

    let text = gunzip(&output);
    let mut lines = text.lines();
    assert_eq!(
        lines.next().unwrap(),
        "study_accession\trun_accession\tread_count\tlibrary_strategy\tlibrary_source\tlibrary_selection\tlibrary_layout\tinstrument_platform\tinstrument_model\tscientific_name\ttax_id"
    );
    let runs: Vec<_> = lines
        .map(|line| line.split('\t').nth(1).unwrap().to_string())
        .collect();
    assert_eq!(runs, vec!["ERR1", "SRR1", "ERR5"]);
}

#[test]
fn slim_ena_min_reads_is_configurable() {
    let temp = tempfile::tempdir().unwrap();
    let input = temp.path().join("merged_runs.tsv");
    fs::write(&input, ENA_MERGED).unwrap();
    let filter = SlimFilter {
        min_reads: 0,
        ..SlimFilter::default()
    };
    let summary = slim_ena(&input, &temp.path().join("slim.tsv"), &filter).unwrap();
    assert_eq!(summary.rows_out, 4);
}

#[test]
fn slim_reports_missing_columns() {
    let temp = tempfile::tempdir().unwrap();
    let input = temp.path().join("broken.tsv");
    fs::write(&input, "run_accession\tread_count\nERR1\t10\n").unwrap();
    let err = slim_ena(&input, &temp.path().join("slim.tsv"), &SlimFilter::default()).unwrap_err();
    assert_matches!(err, KiraError::MissingColumns { missing, .. } if missing.contains(&"study_accession".to_string()));

    fs::write(&input, "").unwrap();
    let err = slim_sra(&input, &temp.path().join("slim.csv"), &SlimFilter::default()).unwrap_err();
    assert_matches!(err, KiraError::EmptyTable(_));

    let err = slim_sra(
        &temp.path().join("absent.csv"),
        &temp.path().join("slim.csv"),
        &SlimFilter::default(),
    )
    .unwrap_err();
    assert_matches!(err, KiraError::MissingInput(_));
}

#[test]
fn combine_prefers_sra_rows() {
    let temp = tempfile::tempdir().unwrap();
    let sra_merged = temp.path().join("sra_merged.csv");
    fs::write(&sra_merged, SRA_MERGED).unwrap();
    let ena_merged = temp.path().join("ena_merged.tsv");
    fs::write(&ena_merged, ENA_MERGED).unwrap();

    let sra_slim = temp.path().join("sra_slim.csv");
    let ena_slim = temp.path().join("ena_slim.tsv");
    slim_sra(&sra_merged, &sra_slim, &SlimFilter::default()).unwrap();
    slim_ena(&ena_merged, &ena_slim, &SlimFilter::default()).unwrap();

    let output = temp.path().join("combined.csv");
    let summary = combine(&ena_slim, &sra_slim, &output).unwrap();

    assert_eq!(summary.sra_rows, 2);
    assert_eq!(summary.ena_rows, 2);
    assert_eq!(summary.dropped_duplicates, 1);
    assert_eq!(summary.written, 4);

    let text = fs::read_to_string(&output).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next().unwrap(), COMBINED_COLUMNS.join(","));
    assert_eq!(
        lines.next().unwrap(),
        "PRJNA1,SRR1,250000,250000,,paired,,,Illumina NovaSeq 6000,Homo sapiens,WGS,RANDOM,METAGENOMIC,SRA"
    );
    let rest: Vec<_> = lines.collect();
    assert_eq!(rest.len(), 3);
    assert_eq!(
        rest[1],
        "PRJEB1,ERR1,300000,,PAIRED,paired,ILLUMINA,Illumina HiSeq 2500,Illumina HiSeq 2500,Homo sapiens,WGS,RANDOM,METAGENOMIC,ENA"
    );
    assert!(rest[2].starts_with("PRJEB2,ERR5,"));
    assert!(rest[2].ends_with(",ILLUMINA,,ILLUMINA,Homo sapiens,WGS,RANDOM,METAGENOMIC,ENA"));
}

#[test]
fn combine_needs_both_inputs() {
    let temp = tempfile::tempdir().unwrap();
    let ena = temp.path().join("ena.tsv");
    fs::write(&ena, "study_accession\n").unwrap();
    let err = combine(&ena, &temp.path().join("sra.csv"), &temp.path().join("out.csv")).unwrap_err();
    assert_matches!(err, KiraError::MissingInput(path) if path.ends_with("sra.csv"));
}

#[test]
fn quotes_in_tab_values_survive_merge_and_slim() {
    let temp = tempfile::tempdir().unwrap();
    let per_query = temp.path().join("per_query");
    fs::create_dir(&per_query).unwrap();
    fs::write(
        per_query.join("gut.read_run.tsv"),
        "study_accession\trun_accession\tread_count\tlibrary_strategy\tlibrary_source\tlibrary_selection\tlibrary_layout\tinstrument_platform\tinstrument_model\tscientific_name\ttax_id\n\
         PRJEB1\tERR1\t300000\tWGS\tMETAGENOMIC\tRANDOM\tPAIRED\tILLUMINA\tIllumina \"NovaSeq\" 6000\tHomo sapiens\t9606\n",
    )
    .unwrap();

    let merged_dir = temp.path().join("merged");
    merge_ena(&per_query, &merged_dir, &EnaMergeOptions::default()).unwrap();
    let merged = fs::read_to_string(merged_dir.join("merged_runs.tsv")).unwrap();
    assert!(merged.contains("\tIllumina \"NovaSeq\" 6000\t"));

    let slim = temp.path().join("ena_slim.tsv");
    let summary = slim_ena(&merged_dir.join("merged_runs.tsv"), &slim, &SlimFilter::default()).unwrap();
    assert_eq!(summary.rows_out, 1);
    let text = fs::read_to_string(&slim).unwrap();
    let row: Vec<_> = text.lines().nth(1).unwrap().split('\t').collect();
    assert_eq!(row[8], "Illumina \"NovaSeq\" 6000");

    let sra = temp.path().join("sra_slim.csv");
    fs::write(
        &sra,
        "BioProject,Run,spots,spots_with_mates,SeqType,SequencingMachine,ScientificName,LibraryStrategy,LibrarySource\n",
    )
    .unwrap();
    let combined = temp.path().join("combined.csv");
    combine(&slim, &sra, &combined).unwrap();
    let text = fs::read_to_string(&combined).unwrap();
    assert!(text.contains(",\"Illumina \"\"NovaSeq\"\" 6000\",\"Illumina \"\"NovaSeq\"\" 6000\","));
}
