//! Shell command behavior: parsing, dump shapes, property round trips

mod common;

use common::{class_info, fixture, method_info, prepare_shop, THREAD};
use sherlok::command::{self, CommandResult};
use sherlok::output::AttrValue;
use sherlok_runtime::{MethodId, ObjectTag};

fn attr_text(tag: &sherlok::output::Tag, key: &str) -> String {
    tag.get(key).map(AttrValue::render).unwrap_or_default()
}

#[test]
fn test_unknown_verb_reports_command_failed() {
    let f = fixture("");
    command::execute(&f.monitor, "frobnicate now");
    let log = f.log();
    assert!(log.contains("Command failed"), "expected a failure event in:\n{log}");
    assert!(log.contains("frobnicate"));
}

#[test]
fn test_bad_option_reports_command_failed() {
    let f = fixture("");
    command::execute(&f.monitor, "lsc -mbogus");
    assert!(f.log().contains("Command failed"));
}

#[test]
fn test_help_lists_commands() {
    let f = fixture("");
    command::execute(&f.monitor, "help");
    let log = f.log();
    assert!(log.contains("lsc"));
    assert!(log.contains("repeat"));
    command::execute(&f.monitor, "man lsm");
    assert!(f.log().contains("list methods"));
}

#[test]
fn test_lsc_filters_and_sorts() {
    let f = fixture("");
    prepare_shop(&f);
    f.monitor.on_class_prepare(
        THREAD,
        &class_info(0x200, "demo/Cache", vec![method_info(0x201, "put")]),
    );

    f.monitor.on_method_enter(THREAD, MethodId(0x101));
    f.monitor.on_object_alloc(THREAD, ObjectTag(1), sherlok_runtime::ClassId(0x100), 1_000);
    f.monitor.on_method_exit(THREAD, MethodId(0x101));
    f.monitor.on_method_enter(THREAD, MethodId(0x201));
    f.monitor.on_object_alloc(THREAD, ObjectTag(2), sherlok_runtime::ClassId(0x200), 5_000);
    f.monitor.on_method_exit(THREAD, MethodId(0x201));

    // Default sort: live bytes descending.
    let list = f.monitor.dump_classes(&sherlok::command::DumpFilter::default());
    assert_eq!(attr_text(&list.children()[0], "ClassName"), "demo/Cache");
    assert_eq!(attr_text(&list.children()[1], "ClassName"), "demo/Shop");

    // Name sort.
    let by_name = f.monitor.dump_classes(&sherlok::command::DumpFilter {
        sort: sherlok::command::ClassSort::Name,
        ..Default::default()
    });
    assert_eq!(attr_text(&by_name.children()[0], "ClassName"), "demo/Cache");

    // Name prefix filter.
    let filtered = f.monitor.dump_classes(&sherlok::command::DumpFilter {
        name_filter: Some("demo/S".to_string()),
        ..Default::default()
    });
    assert_eq!(filtered.children().len(), 1);
    assert_eq!(attr_text(&filtered.children()[0], "ClassName"), "demo/Shop");

    // Byte threshold.
    let min = f.monitor.dump_classes(&sherlok::command::DumpFilter {
        min_bytes: 2_000,
        ..Default::default()
    });
    assert_eq!(min.children().len(), 1);
    assert_eq!(attr_text(&min.children()[0], "ClassName"), "demo/Cache");
}

#[test]
fn test_row_limit_announces_truncation() {
    let f = fixture("");
    prepare_shop(&f);
    for index in 0..10u64 {
        f.monitor.on_class_prepare(
            THREAD,
            &class_info(0x1000 + index, &format!("bulk/Class{index}"), vec![]),
        );
    }

    let list = f.monitor.dump_classes(&sherlok::command::DumpFilter {
        limit: 4,
        ..Default::default()
    });
    assert_eq!(list.children().len(), 4);
    assert_eq!(attr_text(&list, "Truncated"), "7"); // 11 classes, 4 shown
}

#[test]
fn test_lsm_with_hash_and_signature() {
    let f = fixture("");
    prepare_shop(&f);
    f.monitor.on_method_enter(THREAD, MethodId(0x101));
    f.monitor.on_method_exit(THREAD, MethodId(0x101));

    let list = f.monitor.dump_methods(&sherlok::command::MethodFilter {
        with_signature: true,
        with_hash: true,
        min_calls: 1,
        ..Default::default()
    });
    assert_eq!(list.children().len(), 1);
    let row = &list.children()[0];
    assert_eq!(attr_text(row, "MethodName"), "demo/Shop.checkout");
    assert_eq!(attr_text(row, "Signature"), "()V");
    assert_eq!(attr_text(row, "ID"), "101");
}

#[test]
fn test_lsp_save_round_trips() {
    let f = fixture("");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("saved.properties");

    command::execute(&f.monitor, "set HistoryAlert=75");
    command::execute(&f.monitor, &format!("lsp -s{}", path.display()));

    let first = std::fs::read_to_string(&path).unwrap();
    assert!(first.contains("HistoryAlert = 75"));

    // Re-parse and re-write: byte identical.
    let mut reloaded = sherlok::Config::default();
    reloaded.load_properties(&path).unwrap();
    let mut second = Vec::new();
    reloaded.write_properties(&mut second).unwrap();
    assert_eq!(first.into_bytes(), second);
}

#[test]
fn test_set_then_lsp_shows_value() {
    let f = fixture("");
    command::execute(&f.monitor, "set MonitorScope=com/acme");
    let list = f.monitor.dump_properties();
    let row = list
        .children()
        .iter()
        .find(|row| attr_text(row, "Name") == "MonitorScope")
        .unwrap();
    assert_eq!(attr_text(row, "Value"), "com/acme");
}

#[test]
fn test_dex_lists_exceptions_by_count() {
    let f = fixture("");
    prepare_shop(&f);
    for _ in 0..3 {
        f.monitor.on_exception(THREAD, "java/io/IOException", MethodId(0x101), None, None);
    }
    f.monitor.on_exception(THREAD, "java/lang/NullPointerException", MethodId(0x101), None, None);

    let list = f.monitor.dump_exceptions();
    assert_eq!(list.children().len(), 2);
    assert_eq!(attr_text(&list.children()[0], "ClassName"), "java/io/IOException");
    assert_eq!(attr_text(&list.children()[0], "NrCalls"), "3");
}

#[test]
fn test_dt_with_stacks_includes_native_frames() {
    let f = fixture("");
    prepare_shop(&f);
    f.monitor.on_method_enter(THREAD, MethodId(0x101));

    let list = f.monitor.dump_threads(true);
    let callstack = list
        .children()
        .iter()
        .find(|child| child.name() == "Traces")
        .expect("callstack section");
    let rows = callstack.children();
    assert!(rows.iter().any(|r| attr_text(r, "MethodName") == "demo/Shop.checkout"));
    // The scripted host reports one native frame.
    assert!(rows.iter().any(|r| attr_text(r, "Event") == "Native"));
}

#[test]
fn test_lss_reports_counts() {
    let f = fixture("");
    prepare_shop(&f);
    f.monitor.on_method_enter(THREAD, MethodId(0x101));
    f.monitor.on_method_exit(THREAD, MethodId(0x101));

    let list = f.monitor.dump_statistic();
    let value_of = |name: &str| {
        list.children()
            .iter()
            .find(|row| attr_text(row, "Name") == name)
            .map(|row| attr_text(row, "Value"))
            .unwrap()
    };
    assert_eq!(value_of("Classes"), "1");
    assert_eq!(value_of("Methods"), "3");
    assert_eq!(value_of("Threads"), "1");
    assert_eq!(value_of("MethodCalls"), "1");
    assert_eq!(value_of("Generation"), "1");
}

#[test]
fn test_lcf_lists_configuration_sources() {
    let f = fixture("");
    command::execute(&f.monitor, "lcf");
    let log = f.log();
    assert!(log.contains("List Type=File"));
    assert!(log.contains("startup-options"));
    assert!(log.contains("sherlok.log"));
}

#[test]
fn test_echo_info_version() {
    let f = fixture("");
    command::execute(&f.monitor, "echo hello shell");
    command::execute(&f.monitor, "info");
    command::execute(&f.monitor, "version");
    let log = f.log();
    assert!(log.contains("hello shell"));
    assert!(log.contains("monitoring active"));
    assert!(log.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_exit_result() {
    let f = fixture("");
    assert_eq!(command::execute(&f.monitor, "exit"), CommandResult::Exit);
    assert_eq!(command::execute(&f.monitor, "lss"), CommandResult::Continue);
}

#[test]
fn test_lhd_clear_resets_tallies() {
    let f = fixture("");
    prepare_shop(&f);
    f.monitor.on_object_alloc(THREAD, ObjectTag(1), sherlok_runtime::ClassId(0x100), 128);
    f.host.put_object(1, 0x100, 128);

    let first = f.monitor.dump_heap(&sherlok::command::DumpFilter::default());
    assert_eq!(attr_text(&first, "Count"), "1");

    command::execute(&f.monitor, "lhd -c");
    let classes = f.monitor.dump_classes(&sherlok::command::DumpFilter::default());
    assert_eq!(attr_text(&classes.children()[0], "HeapCount"), "0");
}
