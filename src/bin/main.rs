#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_net::{Stack, StackResources};
use embassy_time::Timer;
use esp_hal::{
    Blocking,
    clock::CpuClock,
    dma_circular_buffers,
    i2s::master::{Channels, Config as I2sConfig, DataFormat, I2s, I2sTx},
    peripherals::FLASH,
    rng::{Trng, TrngSource},
    time::Rate,
    timer::timg::TimerGroup,
};
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController};
use log::{LevelFilter, info, warn};
use mbedtls_rs::{Tls, TlsReference};
use soundfetch_core::{
    audio::PlaybackReport,
    config::{
        DEFAULT_HOST, DEFAULT_PATH, DEFAULT_PORT, DownloadSettings, FetchTarget, PlaybackSettings,
    },
    run::{LinkState, PhaseContext, RunPhase, SetupError},
};
use soundfetch_hal_esp32s3::{
    audio::DAC_SAMPLE_RATE_HZ,
    network::WifiConfig,
    storage::{AudioVolume, MountError, mount_audio_volume},
};
use static_cell::StaticCell;

use fetch::FetchError;
use playback::{FilePlayer, PlaybackFailure};

#[path = "main/fetch.rs"]
mod fetch;
#[path = "main/playback.rs"]
mod playback;
#[path = "main/wifi.rs"]
mod wifi;

const I2S_RING_BYTES: usize = 16_000;
const IDLE_LOG_SECS: u64 = 5;

const WIFI_SSID: &str = env!(
    "SOUNDFETCH_WIFI_SSID",
    "Set SOUNDFETCH_WIFI_SSID in your environment before building/flashing."
);
const WIFI_PASSWORD: &str = env!(
    "SOUNDFETCH_WIFI_PASSWORD",
    "Set SOUNDFETCH_WIFI_PASSWORD in your environment before building/flashing."
);
const WIFI_CONFIG: WifiConfig = WifiConfig::new(WIFI_SSID, WIFI_PASSWORD);

const FETCH_HOST: &str = match option_env!("SOUNDFETCH_HOST") {
    Some(host) => host,
    None => DEFAULT_HOST,
};
const FETCH_PATH: &str = match option_env!("SOUNDFETCH_PATH") {
    Some(path) => path,
    None => DEFAULT_PATH,
};
const FETCH_TARGET: FetchTarget = FetchTarget::new(FETCH_HOST, DEFAULT_PORT, FETCH_PATH);

static NET_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
static VOLUME: StaticCell<AudioVolume> = StaticCell::new();
static PLAYER: StaticCell<FilePlayer> = StaticCell::new();

#[derive(Debug)]
enum RunFailure {
    Storage(MountError),
    Fetch(FetchError),
    Playback(PlaybackFailure),
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

async fn idle_forever(reason: &str) -> ! {
    loop {
        info!("{}", reason);
        Timer::after_secs(IDLE_LOG_SECS).await;
    }
}

fn enter(phase: RunPhase) {
    info!("run: {}", phase.label());
}

async fn run_once(
    wifi_controller: &mut WifiController<'_>,
    stack: Stack<'_>,
    flash: FLASH<'static>,
    tls: TlsReference<'_>,
    i2s_tx: &mut I2sTx<'static, Blocking>,
    ring: &'static mut [u8],
) -> Result<PlaybackReport, SetupError<RunFailure>> {
    enter(RunPhase::JoinWifi);
    let attempts = wifi::join(wifi_controller, stack).await;
    info!("wifi joined after {} attempt(s)", attempts);

    enter(RunPhase::MountStorage);
    let volume = mount_audio_volume(flash)
        .map_err(RunFailure::Storage)
        .in_phase(RunPhase::MountStorage)?;
    let volume = VOLUME.init(volume);

    enter(RunPhase::Connect);
    fetch::download_to_flash(stack, tls, &FETCH_TARGET, &DownloadSettings::default(), volume)
        .await
        .map_err(|err| err.map_cause(RunFailure::Fetch))?;

    enter(RunPhase::Playback);
    let player = PLAYER.init_with(|| FilePlayer::new(PlaybackSettings::default()));
    playback::play_file(player, volume, i2s_tx, ring)
        .await
        .map_err(RunFailure::Playback)
        .in_phase(RunPhase::Playback)
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    esp_println::logger::init_logger(LevelFilter::Info);
    esp_println::println!("boot: soundfetch starting");

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // esp-radio requires an allocator.
    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 65536);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let _trng_source = TrngSource::new(peripherals.RNG, peripherals.ADC1);
    let trng = match Trng::try_new() {
        Ok(trng) => trng,
        Err(err) => {
            warn!("trng unavailable: {:?}", err);
            idle_forever("idle: no entropy source").await
        }
    };
    let net_seed = (u64::from(trng.random()) << 32) | u64::from(trng.random());

    // Wiring used by this build:
    // BCLK=GPIO5, WS=GPIO6, DOUT=GPIO7 to an external I2S DAC.
    let (_, _, i2s_ring, i2s_descriptors) = dma_circular_buffers!(0, I2S_RING_BYTES);
    let i2s = match I2s::new(
        peripherals.I2S0,
        peripherals.DMA_CH0,
        I2sConfig::new_tdm_philips()
            .with_sample_rate(Rate::from_hz(DAC_SAMPLE_RATE_HZ))
            .with_data_format(DataFormat::Data16Channel16)
            .with_channels(Channels::STEREO),
    ) {
        Ok(i2s) => i2s,
        Err(err) => {
            warn!("i2s init failed: {:?}", err);
            idle_forever("idle: no audio output").await
        }
    };
    let mut i2s_tx = i2s
        .i2s_tx
        .with_bclk(peripherals.GPIO5)
        .with_ws(peripherals.GPIO6)
        .with_dout(peripherals.GPIO7)
        .build(i2s_descriptors);
    info!("I2S pins: BCLK=GPIO5 WS=GPIO6 DOUT=GPIO7 rate={}", DAC_SAMPLE_RATE_HZ);

    let radio = match esp_radio::init() {
        Ok(radio) => radio,
        Err(err) => {
            warn!("esp-radio init failed: {:?}", err);
            idle_forever("idle: no radio").await
        }
    };

    let (mut wifi_controller, interfaces) =
        match esp_radio::wifi::new(&radio, peripherals.WIFI, esp_radio::wifi::Config::default()) {
            Ok(parts) => parts,
            Err(err) => {
                warn!("wifi peripheral init failed: {:?}", err);
                idle_forever("idle: no wifi").await
            }
        };

    let client_config = ClientConfig::default()
        .with_ssid(WIFI_CONFIG.ssid.into())
        .with_password(WIFI_CONFIG.password.into());
    if let Err(err) = wifi_controller.set_config(&ModeConfig::Client(client_config)) {
        warn!("wifi mode config failed: {:?}", err);
        idle_forever("idle: wifi not configured").await
    }

    let (stack, mut net_runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        NET_RESOURCES.init(StackResources::<4>::new()),
        net_seed,
    );

    let tls = match Tls::new(trng) {
        Ok(tls) => tls,
        Err(err) => {
            warn!("tls init failed: {:?}", err);
            idle_forever("idle: no tls").await
        }
    };

    info!(
        "fetching https://{}:{}{}",
        FETCH_TARGET.host, FETCH_TARGET.port, FETCH_TARGET.path
    );

    let net_future = net_runner.run();
    let run_future = async {
        match run_once(
            &mut wifi_controller,
            stack,
            peripherals.FLASH,
            tls.reference(),
            &mut i2s_tx,
            i2s_ring,
        )
        .await
        {
            Ok(report) => {
                info!(
                    "playback: {} mp3 frames, {} output frames, {} Hz source, skipped {} bytes",
                    report.frames_decoded,
                    report.frames_written,
                    report.sample_rate,
                    report.skipped_bytes
                );
                enter(RunPhase::Idle);
                idle_forever("Playback finished or stopped.").await
            }
            Err(err) => {
                warn!("{}", err);
                let link = LinkState::from_flags(stack.is_link_up(), stack.config_v4().is_some());
                info!("link state: {}", link.label());
                enter(RunPhase::Idle);
                idle_forever("idle: setup returned early").await
            }
        }
    };

    let _ = embassy_futures::join::join(net_future, run_future).await;
    unreachable!()
}
