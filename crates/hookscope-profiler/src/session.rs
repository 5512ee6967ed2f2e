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

//! The profiling session: wires collectors to a registry, owns the call
//! tree, and assembles the final report.

use crate::collectors::{CallerTraceCollector, Collector, FunctionCollector, HookCollector};
use crate::instrument::{InstrumentedList, ProbeSink};
use crate::report::document::ReportDocument;
use crate::report::reporter::ReportSink;
use crate::tree::CallTree;
use anyhow::Context as _;
use hookscope_core::hook::HookRegistry;
use hookscope_core::identity::RegistryIdentityResolver;
use hookscope_core::memory;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// How the profiled run was started, fed into the report header and the
/// report classification.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// Serving host, for web runs.
    pub host: Option<String>,
    /// Request URI, or a stand-in path for non-web runs.
    pub uri: String,
    /// HTTP method, or `"CLI"` for terminal runs.
    pub method: String,
    /// Referer header, when present.
    pub referer: Option<String>,
    /// Scheduled-job run.
    pub is_cron: bool,
    /// Async browser call.
    pub is_ajax: bool,
    /// Terminal run, when detectable.
    pub is_cli: Option<bool>,
    /// Subcommand name for tool-driven runs.
    pub cli_command: Option<String>,
}

impl RequestInfo {
    /// Describes a web request.
    pub fn web(uri: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            host: None,
            uri: uri.into(),
            method: method.into(),
            referer: None,
            is_cron: false,
            is_ajax: false,
            is_cli: None,
            cli_command: None,
        }
    }

    /// Describes a terminal run, optionally under a named subcommand.
    pub fn cli(command: Option<String>) -> Self {
        Self {
            host: None,
            uri: "/".to_string(),
            method: "CLI".to_string(),
            referer: None,
            is_cron: false,
            is_ajax: false,
            is_cli: Some(true),
            cli_command: command,
        }
    }

    /// Sets the serving host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the referer.
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    /// Marks the run as a scheduled job.
    pub fn as_cron(mut self) -> Self {
        self.is_cron = true;
        self
    }

    /// Marks the run as an async browser call.
    pub fn as_ajax(mut self) -> Self {
        self.is_ajax = true;
        self
    }
}

/// A live profiling session over one [`HookRegistry`].
///
/// Dropping the session saves the report if nobody saved it explicitly, so
/// a session bound to the lifetime of a request or process writes its
/// report on the way out even on early returns.
pub struct ProfilerSession {
    registry: Rc<HookRegistry>,
    tree: Rc<RefCell<CallTree>>,
    request: RequestInfo,
    collectors: RefCell<BTreeMap<String, Rc<dyn Collector>>>,
    hook: Rc<HookCollector>,
    function: Rc<FunctionCollector>,
    sink: Box<dyn ReportSink>,
    meta: RefCell<BTreeMap<String, Value>>,
    saved: Cell<bool>,
}

impl ProfilerSession {
    /// Starts a session on `registry`, reporting into `sink`.
    ///
    /// The hook and function collectors start enabled; the caller trace
    /// collector is registered but disabled. Events instrument themselves
    /// on their first dispatch; [`instrument_event`] and
    /// [`instrument_all`] inject probes ahead of that.
    ///
    /// [`instrument_event`]: ProfilerSession::instrument_event
    /// [`instrument_all`]: ProfilerSession::instrument_all
    pub fn bootstrap(
        registry: Rc<HookRegistry>,
        request: RequestInfo,
        sink: Box<dyn ReportSink>,
    ) -> Rc<Self> {
        let _ = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or("info"),
        )
        .try_init();

        let tree = Rc::new(RefCell::new(CallTree::new()));

        let hook = Rc::new(HookCollector::new(tree.clone()));
        hook.enable();
        registry.add_observer(hook.clone());

        let function = Rc::new(FunctionCollector::new(tree.clone()));
        function.enable();
        function.set_resolver(Rc::new(RegistryIdentityResolver::new(Rc::downgrade(
            &registry,
        ))));
        // Events instrument themselves on their first dispatch from here on.
        hook.set_probe_sink(function.clone());

        let trace = Rc::new(CallerTraceCollector::new());
        registry.add_observer(trace.clone());

        let mut collectors: BTreeMap<String, Rc<dyn Collector>> = BTreeMap::new();
        collectors.insert(HookCollector::NAME.to_string(), hook.clone());
        collectors.insert(FunctionCollector::NAME.to_string(), function.clone());
        collectors.insert(CallerTraceCollector::NAME.to_string(), trace);

        log::debug!("profiler session started for {}", request.uri);
        Rc::new(Self {
            registry,
            tree,
            request,
            collectors: RefCell::new(collectors),
            hook,
            function,
            sink,
            meta: RefCell::new(BTreeMap::new()),
            saved: Cell::new(false),
        })
    }

    /// The registry this session observes.
    pub fn registry(&self) -> &Rc<HookRegistry> {
        &self.registry
    }

    /// The tree collector, for event ignore-list tweaks.
    pub fn hook_collector(&self) -> &Rc<HookCollector> {
        &self.hook
    }

    /// The per-callback collector, for ignore-list and resolver tweaks.
    pub fn function_collector(&self) -> &Rc<FunctionCollector> {
        &self.function
    }

    /// Injects timing probes into `event`'s callback list. Safe to call
    /// mid-dispatch; already-instrumented events are left alone.
    pub fn instrument_event(&self, event: &str) -> bool {
        let sink: Rc<dyn ProbeSink> = self.function.clone();
        self.registry.instrument(event, |list| {
            Box::new(InstrumentedList::wrap(event, list, sink))
        })
    }

    /// Instruments every event currently known to the registry.
    pub fn instrument_all(&self) {
        for event in self.registry.event_names() {
            self.instrument_event(&event);
        }
    }

    /// Registers an additional collector under its name.
    pub fn add_collector(&self, collector: Rc<dyn Collector>) {
        self.collectors
            .borrow_mut()
            .insert(collector.name().to_string(), collector);
    }

    /// Looks a collector up by name.
    pub fn collector(&self, name: &str) -> Option<Rc<dyn Collector>> {
        self.collectors.borrow().get(name).cloned()
    }

    /// Enables the named collector. Returns whether it exists.
    pub fn enable_collector(&self, name: &str) -> bool {
        match self.collector(name) {
            Some(collector) => {
                collector.enable();
                true
            }
            None => false,
        }
    }

    /// Disables the named collector. Returns whether it exists.
    pub fn disable_collector(&self, name: &str) -> bool {
        match self.collector(name) {
            Some(collector) => {
                collector.disable();
                true
            }
            None => false,
        }
    }

    /// Whether the named collector exists and is gathering.
    pub fn is_collector_enabled(&self, name: &str) -> bool {
        self.collector(name).is_some_and(|c| c.is_enabled())
    }

    /// Disables every registered collector.
    pub fn disable_all_collectors(&self) {
        for collector in self.collectors.borrow().values() {
            collector.disable();
        }
    }

    /// Runs `f` against the named collector, but only when it exists and
    /// is enabled; otherwise does nothing.
    pub fn call_collector(&self, name: &str, f: impl FnOnce(&dyn Collector)) {
        if let Some(collector) = self.collector(name) {
            if collector.is_enabled() {
                f(collector.as_ref());
            }
        }
    }

    /// Attaches a free-form annotation to the report.
    pub fn set_meta(&self, key: impl Into<String>, value: Value) {
        self.meta.borrow_mut().insert(key.into(), value);
    }

    /// Assembles and persists the report. Idempotent: the second and later
    /// calls are no-ops.
    pub fn try_save_report(&self) -> anyhow::Result<()> {
        if self.saved.replace(true) {
            return Ok(());
        }

        self.tree.borrow_mut().close_root();
        let root_view = {
            let tree = self.tree.borrow();
            tree.node(tree.root()).timer.view()
        };
        let total_time = root_view.time.unwrap_or(0.0);

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let collectors = self.collectors.borrow();
        let mut sections = BTreeMap::new();
        for (name, collector) in collectors.iter() {
            if !collector.is_enabled() {
                continue;
            }
            if let Some(value) = collector.collect() {
                sections.insert(name.clone(), value);
            }
        }

        let (memory_used, peak_memory_used) = session_memory();
        let document = ReportDocument {
            server: self.request.host.clone(),
            url: self.request.uri.clone(),
            timestamp,
            method: self.request.method.to_uppercase(),
            referer: self.request.referer.clone(),
            total_time,
            total_human_time: root_view.human_time.clone().unwrap_or_default(),
            memory_used,
            peak_memory_used,
            is_cron: self.request.is_cron,
            is_ajax: self.request.is_ajax,
            is_cli: self.request.is_cli,
            cli_command: self.request.cli_command.clone(),
            collectors: sections,
            meta: self.meta.borrow().clone(),
        };

        let mut parts = vec![document.method.clone(), timestamp.to_string()];
        let mut by_priority: Vec<_> = collectors
            .values()
            .filter(|c| c.is_enabled())
            .collect();
        by_priority.sort_by_key(|c| c.filename_priority());
        for collector in by_priority {
            parts = collector.filename_parts(&self.request, parts);
        }
        let filename = format!("{}.json", parts.join("-"));
        drop(collectors);

        self.sink
            .save(&filename, &document)
            .with_context(|| format!("saving profiler report '{filename}'"))
    }

    /// Like [`try_save_report`], but logs the failure instead of returning
    /// it. Used from [`Drop`].
    ///
    /// [`try_save_report`]: ProfilerSession::try_save_report
    pub fn save_report(&self) {
        if let Err(err) = self.try_save_report() {
            log::error!("profiler report not saved: {err:#}");
        }
    }
}

impl Drop for ProfilerSession {
    fn drop(&mut self) {
        if !self.saved.get() {
            self.save_report();
        }
    }
}

/// Current and peak memory for the report header.
///
/// Prefers the tracking allocator's counters; when those read zero the
/// allocator is not installed, and the process resident set from the OS is
/// the next best number for both fields.
fn session_memory() -> (u64, u64) {
    let current = memory::current_allocated_bytes() as u64;
    let peak = memory::peak_allocated_bytes() as u64;
    if current > 0 || peak > 0 {
        return (current, peak);
    }

    let Ok(pid) = sysinfo::get_current_pid() else {
        return (0, 0);
    };
    let mut system = sysinfo::System::new();
    system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
    match system.process(pid) {
        Some(process) => (process.memory(), process.memory()),
        None => (0, 0),
    }
}
