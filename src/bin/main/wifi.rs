use embassy_net::Stack;
use embassy_time::{Duration, Timer, WithTimeout};
use esp_radio::wifi::WifiController;
use log::{info, warn};

const JOIN_POLL_MS: u64 = 500;
const DHCP_TIMEOUT_SECS: u64 = 15;
const JOIN_LOG_EVERY: u32 = 20;

/// Associates with the configured access point and waits for a DHCP lease.
///
/// Never gives up; a failed attempt is retried after one poll interval.
/// Returns the number of attempts it took.
pub async fn join(wifi_controller: &mut WifiController<'_>, stack: Stack<'_>) -> u32 {
    let mut attempts = 0u32;

    loop {
        attempts = attempts.saturating_add(1);

        if !wifi_controller.is_started().unwrap_or(false)
            && let Err(err) = wifi_controller.start_async().await
        {
            warn!("wifi start failed: {:?}", err);
            Timer::after_millis(JOIN_POLL_MS).await;
            continue;
        }

        if let Err(err) = wifi_controller.connect_async().await {
            if attempts == 1 || attempts.is_multiple_of(JOIN_LOG_EVERY) {
                info!("wifi connect failed (attempt {}): {:?}", attempts, err);
            }
            let _ = wifi_controller.disconnect_async().await;
            Timer::after_millis(JOIN_POLL_MS).await;
            continue;
        }

        match stack
            .wait_config_up()
            .with_timeout(Duration::from_secs(DHCP_TIMEOUT_SECS))
            .await
        {
            Ok(()) => {
                if let Some(config) = stack.config_v4() {
                    info!("wifi connected, address={}", config.address);
                }
                return attempts;
            }
            Err(_) => {
                warn!("dhcp timeout; reassociating");
                let _ = wifi_controller.disconnect_async().await;
                Timer::after_millis(JOIN_POLL_MS).await;
            }
        }
    }
}
