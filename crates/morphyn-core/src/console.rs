//! Host I/O seams: the diagnostic/log console and named host callbacks

use crate::Value;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

/// Where `log` output and fault diagnostics go, and where `input` reads from
pub trait Console {
    /// Output of the `log` builtin
    fn log(&mut self, line: &str);

    /// A formatted fault or usage diagnostic
    fn report(&mut self, line: &str);

    /// Show `prompt` and read one line; `None` at end of input
    fn read_line(&mut self, prompt: &str) -> Option<String>;
}

/// Standard streams: logs to stdout, diagnostics to stderr, input from stdin
#[derive(Debug, Default, Clone, Copy)]
pub struct StdConsole;

impl Console for StdConsole {
    fn log(&mut self, line: &str) {
        println!("{}", line);
    }

    fn report(&mut self, line: &str) {
        eprintln!("{}", line);
    }

    fn read_line(&mut self, prompt: &str) -> Option<String> {
        print!("{}", prompt);
        io::stdout().flush().ok()?;
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

#[derive(Debug, Default)]
struct Buffers {
    logs: Vec<String>,
    diagnostics: Vec<String>,
    input: VecDeque<String>,
}

/// In-memory console
///
/// Clones share the same buffers, so a host (or a test) can keep one handle
/// while the engine owns another.
#[derive(Debug, Default, Clone)]
pub struct BufferConsole {
    inner: Rc<RefCell<Buffers>>,
}

impl BufferConsole {
    /// Create an empty console
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a line for the next `input`
    pub fn push_input(&self, line: impl Into<String>) {
        self.inner.borrow_mut().input.push_back(line.into());
    }

    /// Everything logged so far
    pub fn logs(&self) -> Vec<String> {
        self.inner.borrow().logs.clone()
    }

    /// Every diagnostic reported so far
    pub fn diagnostics(&self) -> Vec<String> {
        self.inner.borrow().diagnostics.clone()
    }

    /// Drop captured output
    pub fn clear(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.logs.clear();
        inner.diagnostics.clear();
    }
}

impl Console for BufferConsole {
    fn log(&mut self, line: &str) {
        self.inner.borrow_mut().logs.push(line.to_string());
    }

    fn report(&mut self, line: &str) {
        self.inner.borrow_mut().diagnostics.push(line.to_string());
    }

    fn read_line(&mut self, _prompt: &str) -> Option<String> {
        self.inner.borrow_mut().input.pop_front()
    }
}

/// A host function reachable from scripts
pub type Callback = Box<dyn FnMut(&[Value])>;

/// Named host callbacks
#[derive(Default)]
pub struct Callbacks {
    handlers: IndexMap<String, Callback>,
}

impl Callbacks {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a callback
    pub fn register(&mut self, name: impl Into<String>, callback: impl FnMut(&[Value]) + 'static) {
        self.handlers.insert(name.into(), Box::new(callback));
    }

    /// Remove a callback
    pub fn unregister(&mut self, name: &str) -> bool {
        self.handlers.shift_remove(name).is_some()
    }

    /// Invoke a callback; returns false when none is registered
    pub fn invoke(&mut self, name: &str, args: &[Value]) -> bool {
        match self.handlers.get_mut(name) {
            Some(handler) => {
                handler(args);
                true
            }
            None => false,
        }
    }

    /// Check if a callback is registered
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.handlers.keys()).finish()
    }
}
