//! Run configuration.

use std::time::Duration;

use crate::spec::{HttpMethod, Specification};

/// Order in which method buckets are executed.
///
/// Operations that create state run before the ones that read or remove it,
/// so a read finds data a preceding create left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodOrder(Vec<HttpMethod>);

impl MethodOrder {
    pub const DEFAULT: [HttpMethod; 7] = [
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Get,
        HttpMethod::Options,
        HttpMethod::Head,
        HttpMethod::Patch,
        HttpMethod::Delete,
    ];

    /// Custom order. Duplicates are dropped; unlisted methods are not run.
    pub fn new(methods: impl IntoIterator<Item = HttpMethod>) -> Self {
        let mut order = Vec::new();
        for method in methods {
            if !order.contains(&method) {
                order.push(method);
            }
        }
        Self(order)
    }

    pub fn methods(&self) -> &[HttpMethod] {
        &self.0
    }

    pub fn contains(&self, method: HttpMethod) -> bool {
        self.0.contains(&method)
    }
}

impl Default for MethodOrder {
    fn default() -> Self {
        Self(Self::DEFAULT.to_vec())
    }
}

/// Options for one conformance run.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct RunConfig {
    /// Base URL of the API under test, or the URL the document was served from
    pub target: String,
    /// Sleep after every attempt that reached the transport
    pub pacing: Duration,
    /// Prefer declared examples over synthesized values
    pub use_examples: bool,
    /// Build requests without sending them
    pub dry_run: bool,
    /// Appended to every request, after all generated headers
    pub extra_headers: Vec<(String, String)>,
    pub method_order: MethodOrder,
}

impl RunConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            pacing: Duration::ZERO,
            use_examples: true,
            dry_run: false,
            extra_headers: Vec::new(),
            method_order: MethodOrder::default(),
        }
    }

    pub fn pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn use_examples(mut self, use_examples: bool) -> Self {
        self.use_examples = use_examples;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn extra_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    pub fn method_order(mut self, order: MethodOrder) -> Self {
        self.method_order = order;
        self
    }

    /// URL every operation path is appended to.
    ///
    /// A trailing `/swagger.json` and a trailing copy of the base path are
    /// stripped from the target before the base path is re-appended.
    pub fn base_url(&self, spec: &Specification) -> String {
        let base_path = spec.base_path.trim_end_matches('/');
        let mut base = self.target.trim_end_matches('/');
        base = base.strip_suffix("/swagger.json").unwrap_or(base);
        if !base_path.is_empty() {
            base = base.strip_suffix(base_path).unwrap_or(base);
        }
        format!("{base}{base_path}")
    }
}
