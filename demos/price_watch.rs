//! Watches last prices for a couple of symbols the way a ticker widget would:
//! switching symbols, changing the signed-in user, and forcing a refresh.
//!
//! Run with `cargo run --example price_watch`.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;

use request_store::prelude::*;
use tokio::time::sleep;

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Last traded price for `symbol`, as seen by `user`
#[fetcher(revalidate = "3s", namespace = "ticker/24hr")]
async fn last_price(symbol: String, user: Option<String>) -> Result<String, String> {
    sleep(Duration::from_millis(250)).await;
    let base = match symbol.as_str() {
        "BTCUSDT" => 64_000.0,
        "ETHUSDT" => 3_100.0,
        other => return Err(format!("unknown symbol {other}")),
    };
    let tick = TICKS.fetch_add(1, Ordering::SeqCst);
    tracing::info!(%symbol, ?user, tick, "fetched last price");
    Ok(format!("{:.2}", base + tick as f64 * 1.25))
}

fn render(symbol: &str, snapshot: &RequestSnapshot<String, String>) {
    match (snapshot.data(), snapshot.error()) {
        (Some(price), _) => {
            let age = snapshot
                .updated_at()
                .map(|at| format!("{:.1}s ago", at.elapsed().as_secs_f64()))
                .unwrap_or_default();
            println!("{symbol} Last Price: {price} (updated {age})");
        }
        (None, Some(error)) => println!("{symbol} Error! {error}"),
        (None, None) => {}
    }
    if snapshot.is_loading() {
        println!("{symbol} Loading...");
    }
}

struct Widget {
    store: RequestStore,
    user: Option<String>,
    symbol: Arc<Mutex<String>>,
    quote: Option<Subscription<String, String>>,
    _listener: Option<ListenerGuard>,
}

impl Widget {
    fn new(store: RequestStore) -> Self {
        Self {
            store,
            user: None,
            symbol: Arc::new(Mutex::new("BTCUSDT".to_string())),
            quote: None,
            _listener: None,
        }
    }

    fn symbol(&self) -> String {
        self.symbol.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Re-attach to the quote for the current symbol and user.
    fn mount(&mut self) -> StoreResult<()> {
        let symbol = self.symbol();
        // Subscribe before dropping the old quote so a shared key never sees zero holders.
        let quote = self
            .store
            .subscribe(last_price(), (symbol.clone(), self.user.clone()))?;
        let listener = quote.on_change(move |snapshot: &RequestSnapshot<String, String>| {
            render(&symbol, snapshot)
        });
        self._listener = Some(listener);
        self.quote = Some(quote);
        Ok(())
    }

    fn toggle_auth(&mut self) -> StoreResult<()> {
        self.user = match self.user {
            Some(_) => None,
            None => Some("alice".to_string()),
        };
        self.mount()
    }

    fn refresh(&self) {
        if let Some(quote) = &self.quote {
            quote.refresh();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), StoreError> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let store = RequestStore::new(
        StoreConfig::new()
            .with_poll_period(Duration::from_millis(500))
            .with_teardown_grace(Duration::from_secs(1)),
    );
    let mut widget = Widget::new(store.clone());

    // One stable select callback per symbol for the widget's lifetime.
    let selected = widget.symbol.clone();
    let mut on_select = KeyMemo::new((), move |symbol: &str| {
        let selected = selected.clone();
        let symbol = symbol.to_owned();
        Arc::new(move || {
            if let Ok(mut current) = selected.lock() {
                *current = symbol.clone();
            }
        })
    });

    // A second watcher on the same symbol and user shares the widget's record.
    let header = store.subscribe(last_price(), ("BTCUSDT".to_string(), None::<String>))?;

    widget.mount()?;
    sleep(Duration::from_secs(4)).await;
    tracing::info!(version = header.snapshot().version(), "header quote");

    on_select.get("ETHUSDT")();
    widget.mount()?;
    sleep(Duration::from_secs(2)).await;

    widget.toggle_auth()?;
    sleep(Duration::from_secs(1)).await;

    widget.refresh();
    widget.refresh();
    sleep(Duration::from_secs(1)).await;

    on_select.get("BTCUSDT")();
    widget.mount()?;
    sleep(Duration::from_secs(2)).await;

    drop(header);
    tracing::info!(records = store.len(), "done");
    Ok(())
}
