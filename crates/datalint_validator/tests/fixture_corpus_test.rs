//! Integration tests over a corpus of one artifact per recognized format.
//!
//! Binary fixtures are generated with the real writers (Parquet, Arrow IPC,
//! image encoders) or assembled byte by byte (Avro, ORC).

use arrow_array::{Float64Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use datalint_core::{
    Artifact, Check, DatalintError, DatasetFormat, DatasetTask, DatasetType, DiagnosticCode,
    FormatVerdict, InspectionOptions, ValidationStatus,
};
use datalint_validator::{InspectionContext, Inspector};
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use parquet::arrow::ArrowWriter;
use pretty_assertions::assert_eq;
use std::io::{Cursor, Write};
use std::sync::Arc;

fn batch() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("label", DataType::Utf8, true),
        Field::new("score", DataType::Float64, true),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(vec![1, 2, 3, 4])),
            Arc::new(StringArray::from(vec!["cat", "dog", "cat", "bird"])),
            Arc::new(Float64Array::from(vec![0.9, 0.4, 0.7, 0.1])),
        ],
    )
    .unwrap()
}

fn parquet_fixture() -> Vec<u8> {
    let batch = batch();
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
    buf
}

fn arrow_fixture() -> Vec<u8> {
    let batch = batch();
    let mut buf = Vec::new();
    {
        let mut writer = arrow_ipc::writer::FileWriter::try_new(&mut buf, &batch.schema()).unwrap();
        writer.write(&batch).unwrap();
        writer.finish().unwrap();
    }
    buf
}

fn zigzag(value: i64, out: &mut Vec<u8>) {
    let mut n = ((value << 1) ^ (value >> 63)) as u64;
    while n >= 0x80 {
        out.push((n as u8 & 0x7f) | 0x80);
        n >>= 7;
    }
    out.push(n as u8);
}

fn avro_fixture(schema: &str) -> Vec<u8> {
    let sync = *b"SYNCSYNCSYNCSYNC";
    let mut out = b"Obj\x01".to_vec();
    zigzag(1, &mut out);
    zigzag(11, &mut out);
    out.extend_from_slice(b"avro.schema");
    zigzag(schema.len() as i64, &mut out);
    out.extend_from_slice(schema.as_bytes());
    zigzag(0, &mut out);
    out.extend_from_slice(&sync);
    // One block of two longs: 1 and 2.
    zigzag(2, &mut out);
    zigzag(2, &mut out);
    out.extend_from_slice(&[0x02, 0x04]);
    out.extend_from_slice(&sync);
    out
}

fn orc_fixture() -> Vec<u8> {
    let postscript = [0x08, 0x04, 0x10, 0x00, 0x82, 0xF4, 0x03, 0x03, b'O', b'R', b'C'];
    let mut out = b"ORC".to_vec();
    out.extend_from_slice(&[0u8; 4]);
    out.extend_from_slice(&postscript);
    out.push(postscript.len() as u8);
    out
}

fn image_fixture(format: ImageOutputFormat) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_fn(8, 6, |x, y| {
        image::Rgb([(x * 30) as u8, (y * 40) as u8, 128])
    }));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    buf
}

const GIF_FIXTURE: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3B,
];

const RECORD_SCHEMA: &str =
    r#"{"type":"record","name":"row","fields":[{"name":"value","type":"long"}]}"#;

/// (name, bytes, expected format, expected content type)
fn corpus() -> Vec<(&'static str, Vec<u8>, DatasetFormat, DatasetType)> {
    vec![
        ("table.parquet", parquet_fixture(), DatasetFormat::Parquet, DatasetType::Tabular),
        ("table.arrow", arrow_fixture(), DatasetFormat::ArrowIpc, DatasetType::Tabular),
        ("rows.avro", avro_fixture(RECORD_SCHEMA), DatasetFormat::Avro, DatasetType::Tabular),
        ("table.orc", orc_fixture(), DatasetFormat::Orc, DatasetType::Tabular),
        ("img.png", image_fixture(ImageOutputFormat::Png), DatasetFormat::Png, DatasetType::Image),
        (
            "img.jpg",
            image_fixture(ImageOutputFormat::Jpeg(90)),
            DatasetFormat::Jpeg,
            DatasetType::Image,
        ),
        ("img.gif", GIF_FIXTURE.to_vec(), DatasetFormat::Gif, DatasetType::Image),
        (
            "events.jsonl",
            b"{\"user\":\"a\",\"n\":1}\n{\"user\":\"b\",\"n\":2}\n".to_vec(),
            DatasetFormat::JsonLines,
            DatasetType::Tabular,
        ),
        (
            "coco.json",
            br#"{"images":[{"id":1,"file_name":"a.png"}],"annotations":[{"id":1,"image_id":1}]}"#
                .to_vec(),
            DatasetFormat::Json,
            DatasetType::Annotations,
        ),
        (
            "labels.tsv",
            b"file\tlabel\na.png\tcat\nb.png\tdog\n".to_vec(),
            DatasetFormat::Tsv,
            DatasetType::Tabular,
        ),
        (
            "people.csv",
            b"id,name,age\n1,ada,36\n2,grace,45\n".to_vec(),
            DatasetFormat::Csv,
            DatasetType::Tabular,
        ),
    ]
}

#[test]
fn test_every_fixture_is_detected() {
    let inspector = Inspector::new();
    let ctx = InspectionContext::new();
    for (name, bytes, format, dataset_type) in corpus() {
        let report = inspector
            .sniff(&Artifact::bytes(name, bytes), &InspectionOptions::default(), &ctx)
            .unwrap_or_else(|e| panic!("{}: {}", name, e));
        assert_eq!(report.format, format, "{}", name);
        assert_eq!(report.dataset_type, dataset_type, "{}", name);
    }
}

#[test]
fn test_every_fixture_validates() {
    let inspector = Inspector::new();
    let ctx = InspectionContext::new();
    for (name, bytes, format, _) in corpus() {
        let result = inspector
            .validate(
                &Artifact::bytes(name, bytes),
                format,
                &[Check::Structure, Check::Header, Check::Content],
                &InspectionOptions::default(),
                &ctx,
            )
            .unwrap();
        assert_eq!(
            result.status,
            ValidationStatus::Valid,
            "{}: {:?}",
            name,
            result.diagnostics
        );
        assert!(result.diagnostics.is_empty(), "{}", name);
    }
}

#[test]
fn test_sniffing_is_deterministic() {
    let inspector = Inspector::new();
    let ctx = InspectionContext::new();
    for (name, bytes, _, _) in corpus() {
        let artifact = Artifact::bytes(name, bytes);
        let first = inspector.detect(&artifact, &InspectionOptions::default(), &ctx).unwrap();
        let second = inspector.detect(&artifact, &InspectionOptions::default(), &ctx).unwrap();
        assert_eq!(first, second, "{}", name);
    }
}

#[test]
fn test_three_column_csv_is_valid() {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    file.write_all(b"id,name,score\n1,ada,0.9\n2,grace,0.8\n3,linus,0.7\n")
        .unwrap();
    file.flush().unwrap();

    let inspector = Inspector::new();
    let ctx = InspectionContext::new();
    let artifact = Artifact::path(file.path());

    let report = inspector
        .sniff(&artifact, &InspectionOptions::default(), &ctx)
        .unwrap();
    assert_eq!(report.format, DatasetFormat::Csv);
    assert_eq!(report.dialect.unwrap().columns, 3);

    let result = inspector
        .validate(&artifact, DatasetFormat::Csv, &[], &InspectionOptions::default(), &ctx)
        .unwrap();
    assert_eq!(result.status, ValidationStatus::Valid);
    assert!(result.diagnostics.is_empty());
    assert_eq!(result.stats.records_checked, 3);
}

#[test]
fn test_truncated_parquet_is_detected_but_mismatched() {
    let mut bytes = parquet_fixture();
    bytes.truncate(bytes.len() - 16);
    let trailer_offset = bytes.len() as u64 - 4;

    let inspector = Inspector::new();
    let ctx = InspectionContext::new();
    let task = DatasetTask::new(Artifact::bytes("cut.parquet", bytes));
    let outcome = inspector.inspect(&task, &ctx).unwrap();

    assert_eq!(
        outcome.verdict.as_ref().and_then(FormatVerdict::format),
        Some(DatasetFormat::Parquet)
    );
    let validation = outcome.validation.unwrap();
    assert_eq!(validation.status, ValidationStatus::Mismatch);
    let diag = &validation.diagnostics[0];
    assert_eq!(diag.code, DiagnosticCode::CorruptTrailer);
    assert_eq!(diag.offset, Some(trailer_offset));
    assert!(diag.message.contains(&trailer_offset.to_string()));
}

#[test]
fn test_empty_artifact_is_unrecognized() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let err = Inspector::new()
        .sniff(
            &Artifact::path(file.path()),
            &InspectionOptions::default(),
            &InspectionContext::new(),
        )
        .unwrap_err();
    assert!(matches!(err, DatalintError::UnrecognizedFormat { .. }));
}

#[test]
fn test_missing_file_is_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Inspector::new()
        .sniff(
            &Artifact::path(dir.path().join("absent.csv")),
            &InspectionOptions::default(),
            &InspectionContext::new(),
        )
        .unwrap_err();
    assert!(matches!(err, DatalintError::Read { .. }));
}

#[test]
fn test_non_record_avro_is_blob() {
    let report = Inspector::new()
        .sniff(
            &Artifact::bytes("raw.avro", avro_fixture(r#""bytes""#)),
            &InspectionOptions::default(),
            &InspectionContext::new(),
        )
        .unwrap();
    assert_eq!(report.format, DatasetFormat::Avro);
    assert_eq!(report.dataset_type, DatasetType::Blob);
}

#[test]
fn test_ragged_csv_reports_record_and_offset() {
    let result = Inspector::new()
        .validate(
            &Artifact::bytes("ragged.csv", "a,b,c\n1,2,3\n4,5\n6,7,8\n"),
            DatasetFormat::Csv,
            &[],
            &InspectionOptions::default(),
            &InspectionContext::new(),
        )
        .unwrap();
    assert_eq!(result.status, ValidationStatus::Mismatch);
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].code, DiagnosticCode::ColumnCount);
    assert_eq!(result.diagnostics[0].record, Some(2));
    assert_eq!(result.diagnostics[0].offset, Some(12));
}

#[test]
fn test_sniff_window_limits_bytes_inspected() {
    let mut text = String::from("id,value\n");
    for i in 0..5000 {
        text.push_str(&format!("{},{}\n", i, i));
    }
    let report = Inspector::new()
        .sniff(
            &Artifact::bytes("long.csv", text),
            &InspectionOptions::default().with_sniff_bytes(1024),
            &InspectionContext::new(),
        )
        .unwrap();
    assert_eq!(report.format, DatasetFormat::Csv);
    assert_eq!(report.bytes_inspected, 1024);
}
