use crate::event::RuntimeEvent;
use crate::service::{Args, InvokeResult, MethodTable, Service, ServiceContext, ServiceCore};
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use types::{now_millis, Message};

pub const CLOCK_TYPE_KEY: &str = "Clock";
pub const DEFAULT_INTERVAL_MS: u64 = 1000;

/// Publishes the current epoch on a fixed interval
pub struct Clock {
    core: ServiceCore,
    ticker: Option<JoinHandle<()>>,
}

static CLOCK_METHODS: Lazy<MethodTable<Clock>> = Lazy::new(|| {
    MethodTable::<Clock>::with_base()
        .op("publishEpoch", |_, _, _| Ok(json!(now_millis())))
        .op("startClock", |c, ctx, args| {
            let interval: Option<u64> = args.optional(0)?;
            c.start_clock(ctx, interval);
            Ok(Value::Null)
        })
        .op("stopClock", |c, _, _| {
            c.stop_clock();
            Ok(Value::Null)
        })
        .op("isRunning", |c, _, _| Ok(json!(c.is_running())))
});

impl Clock {
    pub fn new(mut core: ServiceCore) -> Self {
        core.type_key = CLOCK_TYPE_KEY.to_string();
        core.apply_config(json!({ "intervalMs": DEFAULT_INTERVAL_MS, "start": false }));
        Self { core, ticker: None }
    }

    pub fn boxed(core: ServiceCore) -> Box<dyn Service> {
        Box::new(Self::new(core))
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    fn interval_ms(&self) -> u64 {
        self.core
            .config_value("intervalMs")
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_INTERVAL_MS)
    }

    fn start_clock(&mut self, ctx: &mut ServiceContext, interval_ms: Option<u64>) {
        self.core.apply_config_value("start", json!(true));
        if let Some(ms) = interval_ms.filter(|ms| *ms > 0) {
            self.core.apply_config_value("intervalMs", json!(ms));
        }

        if self.ticker.is_some() {
            warn!(clock = %self.core.identity, "Clock already running");
            return;
        }

        let period = Duration::from_millis(self.interval_ms());
        let fullname = self.core.identity.to_string();
        let events = ctx.events();
        info!(clock = %fullname, interval_ms = period.as_millis() as u64, "Starting clock");

        self.ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let tick = Message::new(fullname.clone(), "publishEpoch", vec![]).with_sender(fullname.clone());
                if events.send(RuntimeEvent::Deliver(tick)).is_err() {
                    debug!(clock = %fullname, "Runtime gone, clock stopping");
                    break;
                }
            }
        }));
    }

    fn stop_clock(&mut self) {
        self.core.apply_config_value("start", json!(false));
        match self.ticker.take() {
            Some(ticker) => {
                info!(clock = %self.core.identity, "Stopping clock");
                ticker.abort();
            }
            None => debug!(clock = %self.core.identity, "Clock not running"),
        }
    }
}

impl Service for Clock {
    fn core(&self) -> &ServiceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ServiceCore {
        &mut self.core
    }

    fn invoke(&mut self, ctx: &mut ServiceContext, method: &str, args: &Args) -> InvokeResult {
        CLOCK_METHODS.call(self, ctx, method, args)
    }

    fn methods(&self) -> Vec<&'static str> {
        CLOCK_METHODS.names()
    }

    fn start_service(&mut self, ctx: &mut ServiceContext) {
        self.core.start();
        if self.core.config_value::<bool>("start").unwrap_or(false) {
            self.start_clock(ctx, None);
        }
    }

    fn stop_service(&mut self, _ctx: &mut ServiceContext) {
        self.stop_clock();
        self.core.stop();
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use types::Identity;

    fn clock() -> Clock {
        Clock::new(ServiceCore::new(Identity::new("clock01", "P1").unwrap(), "Clock"))
    }

    #[test]
    fn test_publish_epoch() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut ctx = ServiceContext::new(Identity::new("runtime", "P1").unwrap(), tx);
        let mut clock = clock();

        let before = now_millis();
        let epoch = clock.invoke(&mut ctx, "publishEpoch", &Args::empty("publishEpoch")).unwrap();
        assert!(epoch.as_i64().unwrap() >= before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_are_posted_to_the_runtime() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut ctx = ServiceContext::new(Identity::new("runtime", "P1").unwrap(), tx);
        let mut clock = clock();

        clock
            .invoke(&mut ctx, "startClock", &Args::new("startClock", vec![json!(50)]))
            .unwrap();
        assert!(clock.is_running());
        assert_eq!(clock.core().config["intervalMs"], 50);

        for _ in 0..2 {
            match rx.recv().await {
                Some(RuntimeEvent::Deliver(msg)) => {
                    assert_eq!(msg.name, "clock01@P1");
                    assert_eq!(msg.method, "publishEpoch");
                }
                other => panic!("unexpected {:?}", other),
            }
        }

        clock.invoke(&mut ctx, "stopClock", &Args::empty("stopClock")).unwrap();
        assert!(!clock.is_running());
        assert_eq!(clock.core().config["start"], false);
    }

    #[tokio::test]
    async fn test_start_service_honours_config() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut ctx = ServiceContext::new(Identity::new("runtime", "P1").unwrap(), tx);

        let mut idle = clock();
        idle.start_service(&mut ctx);
        assert!(!idle.is_running());

        let mut running = clock();
        running.core_mut().apply_config_value("start", json!(true));
        running.start_service(&mut ctx);
        assert!(running.is_running());
        running.stop_service(&mut ctx);
        assert!(!running.is_running());
        assert!(!running.core().is_ready());
    }
}
