use leak_trace_studio::commands::{
    execute_brk, execute_combine, execute_correlate, execute_memalloc, AnalyzeArgs, CombineArgs,
    CorrelateArgs,
};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;

const CLEAN: &str = "<__1;ts;1;malloc;0x10;8\nmalloc\nA__>\n<__2;ts;1;free;0x10\nfree\nA__>\n";
const LEAK: &str = "<__1;ts;1;malloc;0x30;8\nmalloc\nC__>\n";

fn write(dir: &Path, name: &str, text: &str) {
    fs::write(dir.join(name), text).unwrap();
}

#[test]
fn test_memalloc_writes_all_outputs() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "leak.trace", LEAK);

    execute_memalloc(AnalyzeArgs {
        input: dir.path().join("leak.trace"),
        output: Some(dir.path().join("reports/leak.txt")),
        output_json: Some(dir.path().join("leak.json")),
        output_svg: Some(dir.path().join("leak.svg")),
        flamegraph_config: None,
    })
    .unwrap();

    let report = fs::read_to_string(dir.path().join("reports/leak.txt")).unwrap();
    assert!(report.contains("Strongly suspect leak stack found 1 times\nmalloc\nC\n"));
    assert!(dir.path().join("leak.json").is_file());
    assert!(dir.path().join("leak.svg").is_file());
}

#[test]
fn test_brk_report() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "heap.trace",
        "<__1;ts;1;sbrk;0x1000;100\nsbrk\nmain__>\n<__2;ts;1;sbrk;0x1064;-40\nsbrk\nmain__>\n<__3;ts;1;sbrk;0x103c;0\nsbrk\nmain__>\n",
    );

    execute_brk(AnalyzeArgs {
        input: dir.path().join("heap.trace"),
        ..Default::default()
    })
    .unwrap();

    let report = fs::read_to_string(dir.path().join("heap.trace.report")).unwrap();
    assert!(report.contains("Found 1 brk calls that increased the process virtual memory\n"));
    assert!(report.contains("Found 1 brk calls that decreased the process virtual memory\n"));
    assert!(report.contains("Unique brk stack found 2 times, total size:60\n"));
}

#[test]
fn test_combine_skips_broken_files() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.trace", CLEAN);
    write(dir.path(), "b.trace", LEAK);
    write(dir.path(), "c.trace", "<__1;ts;1;bogus;0x1__>\n");
    let output = dir.path().join("out/combined.txt");

    execute_combine(CombineArgs {
        input_dir: dir.path().to_path_buf(),
        output: output.clone(),
        output_json: None,
        jobs: Some(2),
    })
    .unwrap();

    assert!(dir.path().join("a.trace.report").is_file());
    assert!(dir.path().join("b.trace.report").is_file());
    assert!(!dir.path().join("c.trace.report").exists());

    let combined = fs::read_to_string(&output).unwrap();
    assert!(combined.starts_with(
        "Combined memory allocator analysis for files:\na.trace {0}\nb.trace {1}\n\n"
    ));
    assert!(combined.contains("Suspected leak stack found {0}=0, {1}=1 times\nmalloc\nC\n"));
    assert!(combined.ends_with("Total memory allocations that were not deleted per file :{0}=0, {1}=1\n"));
}

#[test]
fn test_combine_twice_ignores_own_reports() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.trace", LEAK);
    let output = dir.path().join("combined.report");
    let args = CombineArgs {
        input_dir: dir.path().to_path_buf(),
        output: output.clone(),
        ..Default::default()
    };

    execute_combine(args.clone()).unwrap();
    let first = fs::read_to_string(&output).unwrap();
    execute_combine(args).unwrap();
    let second = fs::read_to_string(&output).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_combine_twice_ignores_outputs_without_report_suffix() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.trace", LEAK);
    let output = dir.path().join("combined.txt");
    let args = CombineArgs {
        input_dir: dir.path().to_path_buf(),
        output: output.clone(),
        output_json: Some(dir.path().join("combined.json")),
        jobs: Some(1),
    };

    execute_combine(args.clone()).unwrap();
    let first = fs::read_to_string(&output).unwrap();
    execute_combine(args).unwrap();
    let second = fs::read_to_string(&output).unwrap();

    assert_eq!(first, second);
    assert!(!second.contains("{1}"));
    assert!(!dir.path().join("combined.txt.report").exists());
}

#[test]
fn test_correlate_end_to_end() {
    let root = tempfile::tempdir().unwrap();
    let traces = root.path().join("traces");
    let processed = root.path().join("processed");
    fs::create_dir_all(&traces).unwrap();
    fs::create_dir_all(&processed).unwrap();

    write(&traces, "run.trace", CLEAN);
    write(&processed, "day1", "==\nmalloc\nA\n5\n\nmalloc\nB\n2\n==\nfree\nA\n5\n");
    write(&processed, "day2", "==\nmalloc\nB\n3\n==\nfree\nZ\n1\n");
    let output = root.path().join("correlated.report");

    execute_correlate(CorrelateArgs {
        processed_dir: processed.clone(),
        traces_dir: traces,
        output: output.clone(),
        output_json: Some(root.path().join("correlated.json")),
        print_stacks: true,
        jobs: Some(1),
    })
    .unwrap();

    let day1 = fs::read_to_string(processed.join("day1.report")).unwrap();
    assert!(day1.contains("Found 2 (unfreed) memory allocation calls from 1 unique allocation stacks"));

    let combined = fs::read_to_string(&output).unwrap();
    assert!(combined.contains("*** Allocation Stacks ***"));
    assert!(combined.contains("Suspect allocation stack found {0}=2, {1}=3 times\nmalloc\nB\n"));
    assert!(combined.contains("Unknown Deallocation stack found {0}=0, {1}=1 times\nfree\nZ\n"));
    assert!(combined.ends_with("Memory allocations - memory deallocations per file :{0}=2, {1}=2\n"));
}
