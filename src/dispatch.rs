//! The operation gateway: the seam between call interception and routing.
//!
//! The library does not intercept calls itself — there is no reflection to
//! lean on, and none is needed.  A call is modeled explicitly as an operation
//! identifier plus a borrowed argument list ([`Call`]), and anything that can
//! pick an implementation for a call implements [`DelegateSelector`].
//! [`Gateway`] drives the full lifecycle: select, invoke, report the outcome,
//! and hand the result back unchanged.  A failure from the routed
//! implementation is reported as feedback and then returned verbatim — the
//! gateway never swallows, wraps, or retries it.

/// Description of one operation in a routed operation set.
///
/// Routers that need per-call information (the sharded router's shard key)
/// validate the declared operation set at construction, so a misconfigured
/// set fails before any traffic flows.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Operation {
    /// Operation identifier, unique within its set.
    pub name: &'static str,
    /// Number of arguments the operation takes.
    pub arity: usize,
}

impl Operation {
    /// Describe an operation.
    pub const fn new(name: &'static str, arity: usize) -> Self {
        Self { name, arity }
    }
}

/// An abstract call: which operation, with which arguments.
///
/// Arguments are borrowed and opaque; the routing core only ever touches them
/// through the shard-key extractor supplied to the sharded router.
#[derive(Debug)]
pub struct Call<'a, A> {
    /// Name of the operation being invoked.
    pub operation: &'a str,
    /// The call's arguments, in declaration order.
    pub args: &'a [A],
}

impl<'a, A> Call<'a, A> {
    /// A call of `operation` with `args`.
    pub fn new(operation: &'a str, args: &'a [A]) -> Self {
        Self { operation, args }
    }
}

/// Opaque handle to one implementation held by a selector.
///
/// Meaning is selector-defined: the weighted routers use table indices, the
/// fallback router uses 0 for the old lane and 1 for the new.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmId(pub usize);

/// How an invocation went, reported back to the selector after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// The implementation returned normally.
    Success,
    /// The implementation failed; the failure is being returned to the caller.
    Failure,
}

/// Picks a downstream implementation for a call and (optionally) learns from
/// how the invocation went.
///
/// `select` and `implementation` are split so the gateway can release the
/// borrow of the chosen implementation before reporting: selectors hear about
/// outcomes through the [`ArmId`] they handed out, not through the reference.
pub trait DelegateSelector<T, A> {
    /// Choose an implementation for `call`.
    fn select(&mut self, call: &Call<'_, A>) -> ArmId;

    /// Resolve a previously returned [`ArmId`].
    fn implementation(&self, id: ArmId) -> &T;

    /// Hear how the invocation of `id` went.  Selectors without feedback
    /// loops keep the default no-op.
    fn report(&mut self, id: ArmId, outcome: CallOutcome) {
        let _ = (id, outcome);
    }
}

/// Drives calls through a [`DelegateSelector`]: select, invoke, report,
/// return.
#[derive(Debug)]
pub struct Gateway<S> {
    selector: S,
}

impl<S> Gateway<S> {
    /// Wrap a selector.
    pub fn new(selector: S) -> Self {
        Self { selector }
    }

    /// Read-only access to the wrapped selector.
    pub fn selector(&self) -> &S {
        &self.selector
    }

    /// Unwrap the selector.
    pub fn into_inner(self) -> S {
        self.selector
    }

    /// Route `call`: pick an implementation, run `run` against it, report the
    /// outcome, and return `run`'s result unchanged.
    ///
    /// An `Err` is reported as a failure and then returned as-is; the caller
    /// sees exactly the error the implementation produced.
    pub fn invoke<T, A, R, E>(
        &mut self,
        call: &Call<'_, A>,
        run: impl FnOnce(&T) -> Result<R, E>,
    ) -> Result<R, E>
    where
        S: DelegateSelector<T, A>,
    {
        let id = self.selector.select(call);
        let result = run(self.selector.implementation(id));
        let outcome = match &result {
            Ok(_) => CallOutcome::Success,
            Err(_) => CallOutcome::Failure,
        };
        self.selector.report(id, outcome);
        result
    }
}
