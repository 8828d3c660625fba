//! 单任务事件循环。

use domain::BusRequest;
use han_engine::{Gateway, GatewayEvent};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

/// 驱动网关直到收到 ctrl-c 或总线 channel 关闭。
///
/// 所有事件都在本任务内串行交给 [`Gateway::handle`]。
pub async fn run(mut gateway: Gateway, mut requests: mpsc::Receiver<BusRequest>, tick: Duration) {
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let event = tokio::select! {
            readable = gateway.readable() => {
                if let Err(err) = readable {
                    warn!(target: "han.gateway", error = %err, "device_poll_failed");
                }
                GatewayEvent::DeviceReadable
            }
            _ = ticker.tick() => GatewayEvent::Tick,
            request = requests.recv() => match request {
                Some(request) => GatewayEvent::BusRequest(request),
                None => {
                    warn!(target: "han.gateway", "bus_request_channel_closed");
                    break;
                }
            },
            _ = &mut shutdown => {
                info!(target: "han.gateway", "shutdown_requested");
                break;
            }
        };
        gateway.handle(event).await;
    }

    gateway.disconnect();
}
