//! Service contract
//!
//! Every unit addressable through the runtime implements [`Service`]:
//! shared state lives in a [`ServiceCore`], operations are looked up by
//! name in a per-type [`MethodTable`]. Invoking an operation never walks
//! the subscription table; the runtime forwards results to subscribers
//! after the call returns.

mod args;
mod context;
mod core;
mod table;

pub use self::args::Args;
pub use self::context::ServiceContext;
pub use self::core::ServiceCore;
pub use self::table::{Handler, MethodTable};

use crate::error::Result;
use serde_json::Value;
use types::{Identity, ServiceRecord};

/// Result of a single operation; `Value::Null` stands for "no value"
pub type InvokeResult = Result<Value>;

pub trait Service: Send + 'static {
    fn core(&self) -> &ServiceCore;

    fn core_mut(&mut self) -> &mut ServiceCore;

    /// Run `method` with positional `args`
    fn invoke(&mut self, ctx: &mut ServiceContext, method: &str, args: &Args) -> InvokeResult;

    /// Names of every operation this service answers
    fn methods(&self) -> Vec<&'static str>;

    fn has_method(&self, method: &str) -> bool {
        self.methods().contains(&method)
    }

    fn start_service(&mut self, _ctx: &mut ServiceContext) {
        self.core_mut().start();
    }

    fn stop_service(&mut self, _ctx: &mut ServiceContext) {
        self.core_mut().stop();
    }

    fn record(&self) -> ServiceRecord {
        self.core().record()
    }

    fn identity(&self) -> &Identity {
        &self.core().identity
    }
}
