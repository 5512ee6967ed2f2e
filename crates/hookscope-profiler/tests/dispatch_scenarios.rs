// Copyright 2025 hookscope contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! End-to-end scenarios: a session attached to a live registry, probes
//! injected, reports written and read back.

use hookscope_core::hook::{HookRegistry, HookValue};
use hookscope_profiler::report::MemorySink;
use hookscope_profiler::{
    FileSystemReporter, ProfilerSession, ReportDocument, ReportNode, RequestInfo,
};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;

fn session_with_sink(
    sink: Box<dyn hookscope_profiler::ReportSink>,
) -> (Rc<HookRegistry>, Rc<ProfilerSession>) {
    let registry = Rc::new(HookRegistry::new());
    let session = ProfilerSession::bootstrap(
        registry.clone(),
        RequestInfo::web("/orders/recent", "get").with_host("shop.example"),
        sink,
    );
    (registry, session)
}

struct SharedSink(Rc<MemorySink>);

impl hookscope_profiler::ReportSink for SharedSink {
    fn save(
        &self,
        filename: &str,
        document: &ReportDocument,
    ) -> Result<(), hookscope_profiler::ReportError> {
        self.0.save(filename, document)
    }
}

fn hook_section(document: &ReportDocument) -> ReportNode {
    serde_json::from_value(document.collectors["hook"].clone()).unwrap()
}

#[test]
fn callbacks_are_timed_in_priority_order() {
    let sink = Rc::new(MemorySink::new());
    let (registry, session) = session_with_sink(Box::new(SharedSink(sink.clone())));

    let order = Rc::new(RefCell::new(Vec::new()));
    for (id, priority) in [("b", 20), ("a", 10), ("c", 30)] {
        let order = order.clone();
        registry.register("load", id, priority, 1, move |_, v| {
            order.borrow_mut().push(id);
            v
        });
    }
    session.instrument_all();

    registry.dispatch("load", HookValue::Null);
    assert_eq!(*order.borrow(), vec!["a", "b", "c"]);

    session.try_save_report().unwrap();
    let (_, document) = &sink.saved()[0];
    let tree = hook_section(document);

    let load = &tree.children[0];
    assert_eq!(load.event.as_deref(), Some("load"));
    let names: Vec<_> = load.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    for function in &load.functions {
        assert!(function.timer.time.is_some());
        assert!(function.timer.stop.is_some());
    }
}

#[test]
fn nested_dispatch_produces_a_child_node_once() {
    let sink = Rc::new(MemorySink::new());
    let (registry, session) = session_with_sink(Box::new(SharedSink(sink.clone())));

    let init_runs = Rc::new(RefCell::new(0));
    {
        let init_runs = init_runs.clone();
        registry.register("init", "setup", 10, 1, move |_, v| {
            *init_runs.borrow_mut() += 1;
            v
        });
    }
    {
        let registry_inner = registry.clone();
        registry.register("boot", "b", 20, 1, move |_, v| {
            registry_inner.dispatch("init", HookValue::Null);
            v
        });
    }
    registry.register("boot", "c", 30, 1, |_, v| v);
    session.instrument_all();

    registry.dispatch("boot", HookValue::Null);
    assert_eq!(*init_runs.borrow(), 1);

    session.try_save_report().unwrap();
    let (_, document) = &sink.saved()[0];
    let tree = hook_section(document);

    let boot = &tree.children[0];
    assert_eq!(boot.event.as_deref(), Some("boot"));
    assert_eq!(boot.children.len(), 1);
    let init = &boot.children[0];
    assert_eq!(init.event.as_deref(), Some("init"));
    assert_eq!(init.functions.len(), 1);
    assert_eq!(init.functions[0].name, "setup");
    // init's span nests inside boot's.
    assert!(init.timer.start >= boot.timer.start);
    assert!(init.timer.stop.unwrap() <= boot.timer.stop.unwrap());
}

#[test]
fn same_event_redispatch_nests_and_keeps_fifo_order() {
    let sink = Rc::new(MemorySink::new());
    let (registry, session) = session_with_sink(Box::new(SharedSink(sink.clone())));

    let order = Rc::new(RefCell::new(Vec::new()));
    let redispatched = Rc::new(std::cell::Cell::new(false));
    {
        let order = order.clone();
        registry.register("init", "a", 10, 1, move |_, v| {
            order.borrow_mut().push("a");
            v
        });
    }
    {
        let order = order.clone();
        let redispatched = redispatched.clone();
        let registry_inner = registry.clone();
        // Same priority as "a", registered second: must fire after it.
        registry.register("init", "b", 10, 1, move |_, v| {
            order.borrow_mut().push("b");
            if !redispatched.replace(true) {
                registry_inner.dispatch("init", HookValue::Null);
            }
            v
        });
    }
    {
        let order = order.clone();
        registry.register("init", "c", 20, 1, move |_, v| {
            order.borrow_mut().push("c");
            v
        });
    }
    session.instrument_all();

    registry.dispatch("init", HookValue::Null);
    // The inner run of "init" completes in full while "b" is mid-flight; the
    // outer run then resumes with "c" exactly once.
    assert_eq!(*order.borrow(), vec!["a", "b", "a", "b", "c", "c"]);

    session.try_save_report().unwrap();
    let (_, document) = &sink.saved()[0];
    let tree = hook_section(document);

    let outer = &tree.children[0];
    assert_eq!(outer.event.as_deref(), Some("init"));
    let outer_names: Vec<_> = outer.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(outer_names, vec!["a", "b", "c"]);

    assert_eq!(outer.children.len(), 1);
    let inner = &outer.children[0];
    assert_eq!(inner.event.as_deref(), Some("init"));
    let inner_names: Vec<_> = inner.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(inner_names, vec!["a", "b", "c"]);
    assert!(inner.timer.stop.unwrap() <= outer.timer.stop.unwrap());
}

#[test]
fn mid_dispatch_removal_neither_skips_nor_repeats() {
    let sink = Rc::new(MemorySink::new());
    let (registry, session) = session_with_sink(Box::new(SharedSink(sink.clone())));

    let order = Rc::new(RefCell::new(Vec::new()));
    {
        let order = order.clone();
        let registry_inner = registry.clone();
        registry.register("evt", "a", 10, 1, move |_, v| {
            order.borrow_mut().push("a");
            // Unregister "b" before it runs.
            assert!(registry_inner.remove("evt", "b", 20));
            v
        });
    }
    {
        let order = order.clone();
        registry.register("evt", "b", 20, 1, move |_, v| {
            order.borrow_mut().push("b");
            v
        });
    }
    {
        let order = order.clone();
        registry.register("evt", "c", 30, 1, move |_, v| {
            order.borrow_mut().push("c");
            v
        });
    }
    session.instrument_all();

    registry.dispatch("evt", HookValue::Null);
    assert_eq!(*order.borrow(), vec!["a", "c"]);

    session.try_save_report().unwrap();
    let (_, document) = &sink.saved()[0];
    let tree = hook_section(document);
    let names: Vec<_> = tree.children[0]
        .functions
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(names, vec!["a", "c"]);
    // Every surviving record is fully closed.
    assert!(tree.children[0]
        .functions
        .iter()
        .all(|f| f.timer.time.is_some()));
}

#[test]
fn unresolvable_callback_reports_as_unknown() {
    use hookscope_core::hook::HookEntry;

    let sink = Rc::new(MemorySink::new());
    let (registry, session) = session_with_sink(Box::new(SharedSink(sink.clone())));

    // register_entry without an identity leaves nothing to resolve.
    registry.register_entry(
        "evt",
        10,
        HookEntry::new("anonymous", Rc::new(|_: &HookRegistry, v: HookValue| v)),
    );
    session.instrument_all();

    registry.dispatch("evt", HookValue::Null);
    session.try_save_report().unwrap();

    let (_, document) = &sink.saved()[0];
    let tree = hook_section(document);
    assert_eq!(tree.children[0].functions[0].name, "UNKNOWN");
    assert!(tree.children[0].functions[0].file.is_none());
}

#[test]
fn value_threads_through_probes_untouched() {
    let sink = Rc::new(MemorySink::new());
    let (registry, session) = session_with_sink(Box::new(SharedSink(sink)));

    registry.register("fmt", "upper", 10, 1, |_, v| {
        json!(v.as_str().unwrap_or_default().to_uppercase())
    });
    registry.register("fmt", "exclaim", 20, 1, |_, v| {
        json!(format!("{}!", v.as_str().unwrap_or_default()))
    });
    session.instrument_all();

    let out = registry.dispatch("fmt", json!("hi"));
    assert_eq!(out, json!("HI!"));
    session.try_save_report().unwrap();
}

#[test]
fn report_written_to_disk_parses_back() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Rc::new(HookRegistry::new());
    let session = ProfilerSession::bootstrap(
        registry.clone(),
        RequestInfo::web("/checkout", "post").with_host("shop.example"),
        Box::new(FileSystemReporter::new(dir.path())),
    );

    registry.register("checkout", "charge", 10, 1, |_, v| v);
    session.instrument_all();
    registry.dispatch("checkout", HookValue::Null);
    session.try_save_report().unwrap();

    let web_dir = dir.path().join("profiler").join("web");
    let entries: Vec<_> = std::fs::read_dir(&web_dir).unwrap().collect();
    assert_eq!(entries.len(), 1);
    let path = entries[0].as_ref().unwrap().path();
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.contains("checkout"));
    assert!(name.contains("POST"));
    assert!(name.ends_with(".json"));

    let body = std::fs::read_to_string(&path).unwrap();
    let document: ReportDocument = serde_json::from_str(&body).unwrap();
    assert_eq!(document.server.as_deref(), Some("shop.example"));
    assert_eq!(document.url, "/checkout");
    assert_eq!(document.method, "POST");
    let tree = hook_section(&document);
    assert_eq!(tree.children[0].event.as_deref(), Some("checkout"));
}

#[test]
fn sink_failure_is_contained_by_save_report() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocked");
    std::fs::write(&blocker, b"plain file").unwrap();

    let registry = Rc::new(HookRegistry::new());
    let session = ProfilerSession::bootstrap(
        registry.clone(),
        RequestInfo::web("/", "get"),
        Box::new(FileSystemReporter::new(&blocker)),
    );
    registry.dispatch("evt", HookValue::Null);

    // The logging variant swallows the error; dropping afterwards must not
    // try again or panic.
    session.save_report();
    drop(session);
}

#[test]
fn cli_run_lands_in_the_command_directory() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Rc::new(HookRegistry::new());
    let session = ProfilerSession::bootstrap(
        registry.clone(),
        RequestInfo::cli(Some("sync".to_string())),
        Box::new(FileSystemReporter::new(dir.path())),
    );
    registry.dispatch("run", HookValue::Null);
    session.try_save_report().unwrap();

    assert!(dir.path().join("profiler").join("command").exists());
}

#[test]
fn late_registration_during_dispatch_is_probed() {
    let sink = Rc::new(MemorySink::new());
    let (registry, session) = session_with_sink(Box::new(SharedSink(sink.clone())));
    session.instrument_all();

    {
        let registry_inner = registry.clone();
        registry.register("evt", "first", 10, 1, move |_, v| {
            registry_inner.register("evt", "late", 20, 1, |_, v| v);
            v
        });
    }
    // "evt" gained its list after instrument_all; instrument it directly.
    session.instrument_event("evt");

    registry.dispatch("evt", HookValue::Null);
    session.try_save_report().unwrap();

    let (_, document) = &sink.saved()[0];
    let tree = hook_section(document);
    let names: Vec<_> = tree.children[0]
        .functions
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(names, vec!["first", "late"]);
}
