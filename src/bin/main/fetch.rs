use embassy_net::{
    Stack,
    dns::{self, DnsQueryType},
    tcp::{ConnectError, TcpSocket},
};
use embassy_time::Duration;
use heapless::String as HeaplessString;
use log::{info, warn};
use mbedtls_rs::{TlsError, TlsReference};
use soundfetch_core::{
    config::{DownloadSettings, FetchTarget, OUTPUT_PATH},
    download::{DownloadError, download_body},
    http::{RequestError, write_get_request},
    run::{PhaseContext, RunPhase, SetupError},
    storage::{FileInfo, VolumeError},
};
use soundfetch_hal_esp32s3::{
    network::tls::{MAX_SERVER_NAME_BYTES, TlsSetupError, TlsStream, server_name},
    storage::{AudioVolume, FlashStorageError},
};

const SOCKET_RX_BYTES: usize = 4096;
const SOCKET_TX_BYTES: usize = 1024;
const COPY_CHUNK_BYTES: usize = 1024;
const REQUEST_BYTES: usize = 256;
const SOCKET_TIMEOUT_SECS: u64 = 30;

#[derive(Debug)]
pub enum FetchError {
    LinkDown,
    Dns(dns::Error),
    NoAddress,
    Connect(ConnectError),
    Tls(TlsSetupError),
    Request(RequestError),
    Send(TlsError),
    Create(VolumeError<FlashStorageError>),
    Download(DownloadError<TlsError, VolumeError<FlashStorageError>>),
    Commit(VolumeError<FlashStorageError>),
}

/// Fetches `target` over HTTPS and stores the response body at [`OUTPUT_PATH`].
pub async fn download_to_flash(
    stack: Stack<'_>,
    tls: TlsReference<'_>,
    target: &FetchTarget,
    settings: &DownloadSettings,
    volume: &mut AudioVolume,
) -> Result<FileInfo, SetupError<FetchError>> {
    if !stack.is_config_up() {
        return Err(FetchError::LinkDown).in_phase(RunPhase::Connect);
    }

    let addresses = stack
        .dns_query(target.host, DnsQueryType::A)
        .await
        .map_err(FetchError::Dns)
        .in_phase(RunPhase::Connect)?;
    let address = addresses
        .first()
        .copied()
        .ok_or(FetchError::NoAddress)
        .in_phase(RunPhase::Connect)?;
    info!("fetch: {} resolved to {}", target.host, address);

    let mut rx_buffer = [0u8; SOCKET_RX_BYTES];
    let mut tx_buffer = [0u8; SOCKET_TX_BYTES];
    let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
    socket.set_timeout(Some(Duration::from_secs(SOCKET_TIMEOUT_SECS)));
    socket
        .connect((address, target.port))
        .await
        .map_err(FetchError::Connect)
        .in_phase(RunPhase::Connect)?;

    let mut name_buf = [0u8; MAX_SERVER_NAME_BYTES + 1];
    let name = server_name(target.host, &mut name_buf)
        .map_err(FetchError::Tls)
        .in_phase(RunPhase::Connect)?;
    let mut stream = TlsStream::connect(socket, name, tls, settings.idle_poll_ms)
        .await
        .map_err(FetchError::Tls)
        .in_phase(RunPhase::Connect)?;

    let mut request: HeaplessString<REQUEST_BYTES> = HeaplessString::new();
    write_get_request(&mut request, target)
        .map_err(FetchError::Request)
        .in_phase(RunPhase::Request)?;
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(FetchError::Send)
        .in_phase(RunPhase::Request)?;
    info!("fetch: GET {} sent", target.path);

    let mut writer = volume
        .create(OUTPUT_PATH)
        .map_err(FetchError::Create)
        .in_phase(RunPhase::Download)?;
    let mut chunk = [0u8; COPY_CHUNK_BYTES];
    let report = download_body(&mut stream, &mut writer, &mut chunk, settings)
        .await
        .map_err(FetchError::Download)
        .in_phase(RunPhase::Download)?;
    let file = writer
        .finish()
        .map_err(FetchError::Commit)
        .in_phase(RunPhase::Download)?;

    if report.is_truncated() {
        warn!(
            "fetch: body truncated at {} of {:?} bytes ({:?})",
            report.body_bytes, report.content_length, report.end
        );
    }
    info!(
        "fetch: download complete, {} bytes in {} (idle_polls={})",
        file.len, file.path, report.idle_polls
    );
    Ok(file)
}
