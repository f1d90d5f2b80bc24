use crossbar_core::{Request, Response, ServiceError};
use futures::future::BoxFuture;
use std::sync::Arc;

/// Future type every interceptor produces.
pub type InterceptFuture = BoxFuture<'static, Result<Response, ServiceError>>;

/// The innermost stage of the chain: whatever actually performs the attempt.
pub type Terminal = Arc<dyn Fn(Request) -> InterceptFuture + Send + Sync>;

/// A stage in the request path.
pub trait Interceptor: Send + Sync {
    /// Ordering key; lower runs first (closer to the caller).
    fn priority(&self) -> i32 {
        0
    }

    /// Name for logs and diagnostics.
    fn name(&self) -> &str {
        "<interceptor>"
    }

    /// Handles the request. Implementations either call `next.run(request)`
    /// (possibly with a rewritten request), or resolve without doing so to
    /// short-circuit with a synthetic response or an error.
    fn intercept(&self, request: Request, next: Next) -> InterceptFuture;
}

/// Handle to the remainder of the chain.
///
/// Holds an index into the shared interceptor list; `run` advances it by
/// one. There is no way back, which keeps the chain acyclic by construction.
#[derive(Clone)]
pub struct Next {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    index: usize,
    terminal: Terminal,
}

impl Next {
    /// Invokes the rest of the chain with `request`.
    pub fn run(self, request: Request) -> InterceptFuture {
        match self.interceptors.get(self.index) {
            Some(interceptor) => {
                let interceptor = Arc::clone(interceptor);
                let next = Next {
                    interceptors: Arc::clone(&self.interceptors),
                    index: self.index + 1,
                    terminal: Arc::clone(&self.terminal),
                };
                interceptor.intercept(request, next)
            }
            None => (*self.terminal)(request),
        }
    }
}

/// The assembled, priority-ordered chain.
#[derive(Clone)]
pub struct InterceptorChain {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
}

impl InterceptorChain {
    /// Builds a chain; `interceptors` are sorted by priority, ties keeping
    /// registration order.
    pub fn new(mut interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        interceptors.sort_by_key(|i| i.priority());
        Self {
            interceptors: interceptors.into(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Runs `request` through every interceptor and finally `terminal`.
    pub fn execute(&self, request: Request, terminal: Terminal) -> InterceptFuture {
        Next {
            interceptors: Arc::clone(&self.interceptors),
            index: 0,
            terminal,
        }
        .run(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbar_core::Protocol;
    use parking_lot::Mutex;

    fn request() -> Request {
        Request::builder(Protocol::Rest, "svc").endpoint("/x").build()
    }

    fn echo_terminal() -> Terminal {
        Arc::new(|req: Request| {
            Box::pin(async move {
                Ok(Response::synthetic(req.endpoint().as_bytes().to_vec()))
            })
        })
    }

    struct Recorder {
        tag: &'static str,
        priority: i32,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Interceptor for Recorder {
        fn priority(&self) -> i32 {
            self.priority
        }
        fn intercept(&self, request: Request, next: Next) -> InterceptFuture {
            self.log.lock().push(self.tag);
            next.run(request)
        }
    }

    #[tokio::test]
    async fn runs_in_priority_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new(vec![
            Arc::new(Recorder { tag: "late", priority: 100, log: Arc::clone(&log) }),
            Arc::new(Recorder { tag: "early", priority: -5, log: Arc::clone(&log) }),
            Arc::new(Recorder { tag: "mid", priority: 0, log: Arc::clone(&log) }),
        ]);

        let result = chain.execute(request(), echo_terminal()).await.unwrap();
        assert_eq!(result.body(), b"/x");
        assert_eq!(*log.lock(), vec!["early", "mid", "late"]);
    }

    struct ShortCircuit;

    impl Interceptor for ShortCircuit {
        fn intercept(&self, _request: Request, _next: Next) -> InterceptFuture {
            Box::pin(async { Ok(Response::synthetic(b"cached".to_vec())) })
        }
    }

    #[tokio::test]
    async fn short_circuit_skips_the_terminal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new(vec![
            Arc::new(ShortCircuit),
            Arc::new(Recorder { tag: "after", priority: 10, log: Arc::clone(&log) }),
        ]);
        let result = chain.execute(request(), echo_terminal()).await.unwrap();
        assert_eq!(result.body(), b"cached");
        assert!(log.lock().is_empty());
    }

    struct Rewriter;

    impl Interceptor for Rewriter {
        fn intercept(&self, request: Request, next: Next) -> InterceptFuture {
            next.run(request.with_header("x-rewritten", "yes"))
        }
    }

    #[tokio::test]
    async fn request_rewrites_flow_downstream() {
        let chain = InterceptorChain::new(vec![Arc::new(Rewriter)]);
        let terminal: Terminal = Arc::new(|req: Request| {
            Box::pin(async move {
                assert_eq!(req.headers().get("x-rewritten"), Some("yes"));
                Ok(Response::synthetic(vec![]))
            })
        });
        chain.execute(request(), terminal).await.unwrap();
    }

    #[tokio::test]
    async fn empty_chain_is_just_the_terminal() {
        let chain = InterceptorChain::empty();
        let result = chain.execute(request(), echo_terminal()).await.unwrap();
        assert_eq!(result.body(), b"/x");
    }
}
