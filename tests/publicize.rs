//! End-to-end tests for the publicize pipeline and the command line binary.
//!
//! Tests that need a real .NET assembly look for one under `tests/samples/`. When none is
//! present they report the skip on stderr and return, unless `REQUIRE_SAMPLES_ENV` is set, in
//! which case a missing sample fails the test.

use std::{
    path::{Path, PathBuf},
    process::Command,
};

use assembly_publicizer::{
    access::{MemberAccess, TypeVisibility},
    boundary,
    layout::ModuleLayout,
    marker::{self, MARKER_TYPE_NAME},
    publicize::{publicize, PublicizeReport, Target},
};
use dotscope::CilAssemblyView;

const SAMPLES: &[&str] = &["tests/samples/crafted_2.exe", "tests/samples/WindowsBase.dll"];

/// Set to any value to turn a missing sample into a test failure.
const REQUIRE_SAMPLES_ENV: &str = "ASSEMBLY_PUBLICIZER_REQUIRE_SAMPLES";

fn find_sample(candidates: &[&str]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|s| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(s))
        .find(|p| p.is_file())
}

/// Returns a sample assembly, or `None` after announcing the skip on stderr.
///
/// Panics instead of skipping when `REQUIRE_SAMPLES_ENV` is set.
fn sample(test: &str) -> Option<PathBuf> {
    let found = find_sample(SAMPLES);
    if found.is_none() {
        assert!(
            std::env::var_os(REQUIRE_SAMPLES_ENV).is_none(),
            "{test}: no sample assembly found at any of {SAMPLES:?}"
        );
        eprintln!("Skipping {test}: sample not found at any of {SAMPLES:?}");
        eprintln!("  place a .NET assembly at one of those paths to run it");
    }
    found
}

fn binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_assembly-publicizer"))
}

/// Runs the library pipeline on `input` and writes the result to `output`.
fn publicize_file(input: &Path, output: &Path) -> (PublicizeReport, bool) {
    let mut assembly = boundary::load(input).unwrap();
    let layout = ModuleLayout::from_view(assembly.view()).unwrap();
    let ctor = marker::ensure_marker(&mut assembly, &layout).unwrap();
    let report = publicize(&layout, &ctor, &mut assembly).unwrap();
    boundary::save(&mut assembly, output).unwrap();
    (report, ctor.created())
}

#[test]
fn sample_lookup_skips_missing_candidates() {
    assert_eq!(find_sample(&["tests/samples/no-such-assembly.dll"]), None);
    assert_eq!(
        find_sample(&["tests/samples/no-such-assembly.dll", "Cargo.toml"]),
        Some(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml"))
    );
}

#[test]
fn missing_input_exits_30_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("out");

    let status = binary()
        .arg(dir.path().join("does-not-exist.dll"))
        .arg("-o")
        .arg(format!("{}/", out_dir.display()))
        .status()
        .unwrap();

    assert_eq!(status.code(), Some(30));
    assert!(!out_dir.exists());
}

#[test]
fn invalid_input_exits_40_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("readme.dll");
    std::fs::write(&input, b"MZ but certainly not a managed module").unwrap();
    let out_dir = dir.path().join("out");

    let output = binary()
        .arg(&input)
        .arg("-o")
        .arg(format!("{}/", out_dir.display()))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(40));
    assert!(String::from_utf8_lossy(&output.stderr).starts_with("ERROR! "));
    assert!(!out_dir.exists());
}

#[test]
fn unwritable_output_exits_50() {
    let Some(input) = sample("unwritable_output_exits_50") else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"").unwrap();

    let status = binary()
        .arg(&input)
        .arg("-o")
        .arg(blocker.join("out.dll"))
        .status()
        .unwrap();

    assert_eq!(status.code(), Some(50));
}

#[test]
fn binary_prints_counts_and_writes_default_name() {
    let Some(input) = sample("binary_prints_counts_and_writes_default_name") else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();

    let output = binary()
        .arg(&input)
        .arg("-o")
        .arg(format!("{}/", dir.path().display()))
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 6);
    assert!(lines[0].starts_with("Changed ") && lines[0].ends_with(" types to public."));
    assert!(lines[1].ends_with(" methods (including getters and setters) to public."));
    assert!(lines[2].ends_with(" fields to public."));
    assert_eq!(lines[3], "");
    assert_eq!(lines[4], "Saving a copy of the modified assembly ...");
    assert_eq!(lines[5], "Completed.");

    let expected = boundary::resolve_output_path(&input, &format!("{}/", dir.path().display()));
    assert!(expected.is_file());
    assert!(expected
        .file_name()
        .unwrap()
        .to_string_lossy()
        .contains("_publicized."));
}

#[test]
fn json_report_matches_library_counts() {
    let Some(input) = sample("json_report_matches_library_counts") else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();

    let (expected, _) = publicize_file(&input, &dir.path().join("lib.dll"));

    let output = binary()
        .arg(&input)
        .arg("-o")
        .arg(dir.path().join("bin.dll"))
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["changed"]["types"], expected.types);
    assert_eq!(json["changed"]["methods"], expected.methods);
    assert_eq!(json["changed"]["fields"], expected.fields);
    assert_eq!(json["marker_created"], true);
}

#[test]
fn everything_is_public_and_marked_after_publicize() {
    let Some(input) = sample("everything_is_public_and_marked_after_publicize") else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.dll");

    let before = ModuleLayout::from_view(boundary::load(&input).unwrap().view()).unwrap();
    let (report, created) = publicize_file(&input, &output);
    assert!(created);

    let view = CilAssemblyView::from_path(&output).unwrap();
    let after = ModuleLayout::from_view(&view).unwrap();

    for ty in after.types() {
        assert_eq!(
            ty.visibility(),
            TypeVisibility::widest(ty.nested),
            "{} is not visible",
            ty.full_name()
        );
        for member in ty.methods.iter().chain(&ty.fields) {
            assert_eq!(member.access(), MemberAccess::Public, "{}", member.name);
        }
    }

    let marker_type = after.find_type("", MARKER_TYPE_NAME).unwrap();
    assert_eq!(marker_type.visibility(), TypeVisibility::Public);
    assert_eq!(after.types().len(), before.types().len() + 1);

    let records = marker::read_markers(&view).unwrap();
    assert_eq!(records.len(), report.total());

    // every record names the element's visibility from before the run
    for record in &records {
        match record.target {
            Target::Type(rid) => {
                let ty = before.types().iter().find(|t| t.rid == rid).unwrap();
                assert_eq!(record.original_visibility(), Some(ty.visibility()));
            }
            Target::Method(rid) => {
                let method = before
                    .types()
                    .iter()
                    .flat_map(|t| &t.methods)
                    .find(|m| m.rid == rid)
                    .unwrap();
                assert_eq!(record.original_access(), Some(method.access()));
            }
            Target::Field(rid) => {
                let field = before
                    .types()
                    .iter()
                    .flat_map(|t| &t.fields)
                    .find(|f| f.rid == rid)
                    .unwrap();
                assert_eq!(record.original_access(), Some(field.access()));
            }
        }
    }

    let marked_types = records
        .iter()
        .filter(|r| matches!(r.target, Target::Type(_)))
        .count();
    assert_eq!(marked_types, report.types);
}

#[test]
fn second_run_changes_nothing() {
    let Some(input) = sample("second_run_changes_nothing") else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.dll");
    let second = dir.path().join("second.dll");

    let (first_report, _) = publicize_file(&input, &first);
    let (second_report, created) = publicize_file(&first, &second);

    assert!(!created, "marker type must be reused");
    assert_eq!(second_report, PublicizeReport::default());

    let view = CilAssemblyView::from_path(&second).unwrap();
    let layout = ModuleLayout::from_view(&view).unwrap();
    let marker_types = layout
        .types()
        .iter()
        .filter(|t| t.namespace.is_empty() && t.name == MARKER_TYPE_NAME)
        .count();
    assert_eq!(marker_types, 1);
    assert_eq!(
        marker::read_markers(&view).unwrap().len(),
        first_report.total()
    );
}
