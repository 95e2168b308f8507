//! Launch command and environment templates.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Values available to command and environment templates.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchArgs {
    pub port: u16,
    pub unix_socket: Option<PathBuf>,
    pub base_url: String,
}

impl LaunchArgs {
    fn lookup(&self, key: &str) -> Option<String> {
        match key {
            "port" => Some(self.port.to_string()),
            "unix_socket" => Some(
                self.unix_socket
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            ),
            "base_url" => Some(self.base_url.clone()),
            _ => None,
        }
    }
}

/// Expand `{port}`, `{unix_socket}` and `{base_url}`.
///
/// `{{` and `}}` produce literal braces; unknown keys are left untouched.
pub fn render_template(template: &str, args: &LaunchArgs) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(&['{', '}'][..]) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }

        if tail.starts_with('{') {
            if let Some(end) = tail.find('}') {
                if let Some(value) = args.lookup(&tail[1..end]) {
                    out.push_str(&value);
                    rest = &tail[end + 1..];
                    continue;
                }
            }
        }

        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }

    out.push_str(rest);
    out
}

/// Types whose literal form can be rendered with [`LaunchArgs`].
pub trait Render {
    fn render(&self, args: &LaunchArgs) -> Self;
}

impl Render for Vec<String> {
    fn render(&self, args: &LaunchArgs) -> Self {
        self.iter().map(|s| render_template(s, args)).collect()
    }
}

impl Render for HashMap<String, String> {
    fn render(&self, args: &LaunchArgs) -> Self {
        self.iter()
            .map(|(k, v)| (k.clone(), render_template(v, args)))
            .collect()
    }
}

/// A literal template or a function of the launch arguments.
pub enum Templated<T> {
    Literal(T),
    Computed(Arc<dyn Fn(&LaunchArgs) -> T + Send + Sync>),
}

impl<T: Render> Templated<T> {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&LaunchArgs) -> T + Send + Sync + 'static,
    {
        Templated::Computed(Arc::new(f))
    }

    pub fn resolve(&self, args: &LaunchArgs) -> T {
        match self {
            Templated::Literal(value) => value.render(args),
            Templated::Computed(f) => f(args),
        }
    }
}

impl<T: Clone> Clone for Templated<T> {
    fn clone(&self) -> Self {
        match self {
            Templated::Literal(value) => Templated::Literal(value.clone()),
            Templated::Computed(f) => Templated::Computed(Arc::clone(f)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Templated<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Templated::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Templated::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl<T: Default> Default for Templated<T> {
    fn default() -> Self {
        Templated::Literal(T::default())
    }
}

/// Argument vector for a shell command line.
pub fn shell_command(line: &str) -> Vec<String> {
    vec!["/bin/sh".to_string(), "-c".to_string(), line.to_string()]
}
