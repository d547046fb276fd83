//! Execution ordering, outcome classification and postponement
//!
//! Operations run strictly one at a time, bucketed by HTTP method in the
//! configured order. Within a bucket the pending queue is drained first,
//! then the retry queue. A 404 moves an operation to the retry queue once;
//! a second 404 for the same operation ends the run.

use std::collections::{HashSet, VecDeque};
use std::error::Error as StdError;
use std::fmt;
use std::iter::FusedIterator;
use std::thread;

use serde::Serialize;
use tracing::{debug, info, info_span, warn, Span};

use crate::builder::{build_request, PreparedRequest};
use crate::config::{MethodOrder, RunConfig};
use crate::dispatch::{RawResponse, Transport};
use crate::error::RunError;
use crate::matcher::DefinitionMatcher;
use crate::report::Summary;
use crate::resolver::Resolver;
use crate::spec::{HttpMethod, Operation, Specification};

/// Statuses accepted without looking at the body.
pub const SUCCESS_STATUSES: [u16; 2] = [200, 201];
/// Read as "dependency not created yet".
pub const NOT_FOUND: u16 = 404;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Attempt {
    First,
    Retry,
}

/// Why an attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    /// The request never produced an HTTP response.
    Network { message: String },
    /// Neither the exact status nor `default` is declared.
    UndeclaredStatus { declared: Vec<String> },
    /// The body does not fit the declared response shape.
    ValidationMismatch,
}

impl Failure {
    /// `false` when the request could not be sent at all.
    pub fn request_sent(&self) -> bool {
        !matches!(self, Self::Network { .. })
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network { message } => write!(f, "request not sent: {message}"),
            Self::UndeclaredStatus { declared } => {
                write!(f, "undeclared status, expected one of [{}]", declared.join(", "))
            }
            Self::ValidationMismatch => f.write_str("response body does not match the declared shape"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed { reason: Failure },
    /// 404 on the first attempt; the operation will be retried once.
    Postponed,
    /// 404 again after postponement.
    RetryExhausted,
    /// Built but not sent.
    DryRun,
}

/// Result of one attempt at one operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionOutcome {
    pub method: HttpMethod,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    pub url: String,
    pub status: Option<u16>,
    pub attempt: Attempt,
    pub verdict: Verdict,
    /// The request that would have been sent; dry runs only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<PreparedRequest>,
}

impl ExecutionOutcome {
    fn new(op: &Operation, url: &str, attempt: Attempt, status: Option<u16>, verdict: Verdict) -> Self {
        Self {
            method: op.method,
            path: op.path.clone(),
            operation_id: op.operation_id.clone(),
            url: url.to_string(),
            status,
            attempt,
            verdict,
            request: None,
        }
    }
}

/// State that lives exactly as long as one run.
#[derive(Debug)]
pub struct RunContext {
    span: Span,
    postponed: HashSet<(HttpMethod, String)>,
    attempts: usize,
}

impl RunContext {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            span: info_span!("conformance_run", target = %config.target, dry_run = config.dry_run),
            postponed: HashSet::new(),
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn postponed(&self) -> usize {
        self.postponed.len()
    }

    /// Record a postponement; `false` if this operation was already postponed.
    fn postpone(&mut self, op: &Operation) -> bool {
        self.postponed.insert((op.method, op.path.clone()))
    }
}

struct Bucket<'a> {
    method: HttpMethod,
    pending: VecDeque<&'a Operation>,
    retry: VecDeque<&'a Operation>,
}

/// Lazily runs every operation, yielding one outcome per attempt.
///
/// After a `RetryExhausted` error the iterator is finished.
pub struct Scheduler<'a, T> {
    config: &'a RunConfig,
    transport: T,
    resolver: Resolver<'a>,
    matcher: DefinitionMatcher<'a>,
    base_url: String,
    ctx: RunContext,
    buckets: VecDeque<Bucket<'a>>,
    done: bool,
}

/// Validate `spec` and start a run with a fresh context.
pub fn run<'a, T: Transport>(
    spec: &'a Specification,
    config: &'a RunConfig,
    transport: T,
) -> Result<Scheduler<'a, T>, RunError> {
    Scheduler::new(spec, config, transport, RunContext::new(config))
}

/// Drive a run to its end, counting every outcome.
pub fn run_to_completion<T: Transport>(
    spec: &Specification,
    config: &RunConfig,
    transport: T,
) -> Result<Summary, RunError> {
    let mut summary = Summary::default();
    for outcome in run(spec, config, transport)? {
        summary.record(&outcome?);
    }
    Ok(summary)
}

impl<'a, T: Transport> Scheduler<'a, T> {
    pub fn new(
        spec: &'a Specification,
        config: &'a RunConfig,
        transport: T,
        ctx: RunContext,
    ) -> Result<Self, RunError> {
        spec.validate()?;

        let base_url = config.base_url(spec);
        let buckets = {
            let _guard = ctx.span.enter();
            let buckets = partition(spec, &config.method_order);
            info!(
                base_url = %base_url,
                operations = buckets.iter().map(|b| b.pending.len()).sum::<usize>(),
                use_examples = config.use_examples,
                "starting conformance run"
            );
            buckets
        };

        Ok(Self {
            config,
            transport,
            resolver: Resolver::new(spec, config.use_examples),
            matcher: DefinitionMatcher::new(spec),
            base_url,
            ctx,
            buckets,
            done: false,
        })
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    fn attempt(&mut self, op: &'a Operation, attempt: Attempt) -> Result<ExecutionOutcome, RunError> {
        let values = self.resolver.resolve(op);
        let request = build_request(&self.base_url, op, &values, &self.config.extra_headers);
        self.ctx.attempts += 1;

        if self.config.dry_run {
            debug!(
                method = %op.method,
                url = %request.url,
                body = ?request.body,
                headers = ?request.headers,
                "dry run, request not sent"
            );
            let mut outcome = ExecutionOutcome::new(op, &request.url, attempt, None, Verdict::DryRun);
            outcome.request = Some(request);
            return Ok(outcome);
        }

        info!(method = %op.method, url = %request.url, summary = %op.summary, ?attempt, "testing operation");
        let sent = self.transport.send(&request);
        if !self.config.pacing.is_zero() {
            thread::sleep(self.config.pacing);
        }

        let response = match sent {
            Ok(response) => response,
            Err(err) => {
                let message = error_chain(&err);
                warn!(method = %op.method, url = %request.url, "request failed: {message}");
                let verdict = Verdict::Failed {
                    reason: Failure::Network { message },
                };
                return Ok(ExecutionOutcome::new(op, &request.url, attempt, None, verdict));
            }
        };

        let status = Some(response.status);
        if response.status == NOT_FOUND {
            if self.ctx.postpone(op) {
                info!(method = %op.method, url = %request.url, "not found, postponing");
                if let Some(bucket) = self.buckets.front_mut() {
                    bucket.retry.push_back(op);
                }
                return Ok(ExecutionOutcome::new(op, &request.url, attempt, status, Verdict::Postponed));
            }
            warn!(method = %op.method, url = %request.url, "not found again after postponement");
            let outcome = ExecutionOutcome::new(op, &request.url, attempt, status, Verdict::RetryExhausted);
            return Err(RunError::RetryExhausted {
                method: op.method,
                path: op.path.clone(),
                outcome: Box::new(outcome),
            });
        }

        let verdict = self.classify(op, &response);
        info!(method = %op.method, url = %request.url, status = response.status, ?verdict, "classified");
        Ok(ExecutionOutcome::new(op, &request.url, attempt, status, verdict))
    }

    fn classify(&self, op: &Operation, response: &RawResponse) -> Verdict {
        if SUCCESS_STATUSES.contains(&response.status) {
            return Verdict::Passed;
        }
        let Some(expected) = op.response_for(response.status) else {
            return Verdict::Failed {
                reason: Failure::UndeclaredStatus {
                    declared: op.responses.keys().map(ToString::to_string).collect(),
                },
            };
        };
        if self.matcher.matches(expected, &response.json()) {
            Verdict::Passed
        } else {
            Verdict::Failed {
                reason: Failure::ValidationMismatch,
            }
        }
    }
}

impl<'a, T: Transport> Iterator for Scheduler<'a, T> {
    type Item = Result<ExecutionOutcome, RunError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let span = self.ctx.span.clone();
        let _guard = span.enter();

        loop {
            let Some(bucket) = self.buckets.front_mut() else {
                self.done = true;
                info!(
                    attempts = self.ctx.attempts,
                    postponed = self.ctx.postponed.len(),
                    "conformance run finished"
                );
                return None;
            };

            let next = match bucket.pending.pop_front() {
                Some(op) => Some((op, Attempt::First)),
                None => bucket.retry.pop_front().map(|op| (op, Attempt::Retry)),
            };

            match next {
                Some((op, attempt)) => {
                    let result = self.attempt(op, attempt);
                    self.done = result.is_err();
                    return Some(result);
                }
                None => {
                    self.buckets.pop_front();
                }
            }
        }
    }
}

impl<'a, T: Transport> FusedIterator for Scheduler<'a, T> {}

fn partition<'a>(spec: &'a Specification, order: &MethodOrder) -> VecDeque<Bucket<'a>> {
    let mut buckets: VecDeque<Bucket<'a>> = order
        .methods()
        .iter()
        .map(|&method| Bucket {
            method,
            pending: VecDeque::new(),
            retry: VecDeque::new(),
        })
        .collect();

    for op in spec.operations() {
        match buckets.iter_mut().find(|b| b.method == op.method) {
            Some(bucket) => bucket.pending.push_back(op),
            None => warn!(method = %op.method, path = %op.path, "method not in run order, skipping"),
        }
    }
    buckets
}

fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
