use crate::service::{Args, InvokeResult, MethodTable, Service, ServiceContext, ServiceCore};
use once_cell::sync::Lazy;
use serde_json::json;
use types::ServiceRecord;

pub const UNKNOWN_TYPE_KEY: &str = "Unknown";

/// Placeholder for a type that could not be resolved at launch.
///
/// Answers the base operations so it can still be addressed, subscribed
/// to and released like any other service.
pub struct Unknown {
    core: ServiceCore,
    requested_type_key: String,
}

static UNKNOWN_METHODS: Lazy<MethodTable<Unknown>> = Lazy::new(|| {
    MethodTable::<Unknown>::with_base().op("getRequestedTypeKey", |u, _, _| Ok(json!(u.requested_type_key)))
});

impl Unknown {
    pub fn new(mut core: ServiceCore, requested_type_key: impl Into<String>) -> Self {
        core.type_key = UNKNOWN_TYPE_KEY.to_string();
        Self {
            core,
            requested_type_key: requested_type_key.into(),
        }
    }

    pub fn requested_type_key(&self) -> &str {
        &self.requested_type_key
    }
}

impl Service for Unknown {
    fn core(&self) -> &ServiceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ServiceCore {
        &mut self.core
    }

    fn invoke(&mut self, ctx: &mut ServiceContext, method: &str, args: &Args) -> InvokeResult {
        UNKNOWN_METHODS.call(self, ctx, method, args)
    }

    fn methods(&self) -> Vec<&'static str> {
        UNKNOWN_METHODS.names()
    }

    fn record(&self) -> ServiceRecord {
        let mut record = self.core.record();
        record
            .extra
            .insert("requestTypeKey".into(), json!(self.requested_type_key));
        record
    }
}
