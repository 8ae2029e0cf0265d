//! Appliance Transport (spec 4.E): a short-lived HTTP/1.1 client that
//! performs one POST (or `GET /ping`) transaction per call over a raw TCP
//! socket, with bounded connect/write/read retries.

use banner_registry::{ConnectionStatus, DeviceEntry};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_RETRIES: u32 = 5;
const RETRY_SPACING: Duration = Duration::from_secs(1);

const USER_AGENT: &str = "MessageNet Evolution Banner Socket";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no-address")]
    NoAddress,
    #[error("connect-failed")]
    ConnectFailed,
    #[error("write-failed")]
    WriteFailed,
    #[error("read-timeout")]
    ReadTimeout,
}

/// Send one JSON-bodied HTTP/1.1 POST to `entry`'s current address,
/// returning the raw response bytes. Implements spec 4.E's algorithm
/// exactly, including the bounded retries and the connection-status/
/// address-hint side effects on each exit path.
pub async fn send_request(entry: &DeviceEntry, body: &[u8]) -> Result<Vec<u8>, TransportError> {
    transact(entry, &build_post_request(body)).await
}

/// `GET /ping?password=...`, the liveness probe spec 4.E and 4.I describe.
/// Updates connection status identically to `send_request`; the response
/// body itself carries no richer status than reachable/unreachable.
pub async fn probe_liveness(entry: &DeviceEntry) -> Result<(), TransportError> {
    let password = entry.password.clone();
    let request = build_ping_request(&password);
    transact(entry, &request).await.map(|_| ())
}

async fn transact(entry: &DeviceEntry, request: &[u8]) -> Result<Vec<u8>, TransportError> {
    let address = {
        let state = entry.state.lock().await;
        match &state.address {
            banner_protocol::AddressConfig::Fixed(addr) => Some(addr.clone()),
            banner_protocol::AddressConfig::Auto => None,
        }
    };
    let Some(address) = address else {
        tracing::warn!(device = entry.record_number, "appliance transport: no address");
        entry.state.lock().await.connection_status = ConnectionStatus::Closed;
        return Err(TransportError::NoAddress);
    };

    let stream = match connect_with_retries(&address).await {
        Some(stream) => stream,
        None => {
            tracing::warn!(device = entry.record_number, %address, "appliance transport: connect failed");
            let mut state = entry.state.lock().await;
            state.clear_learned_address();
            state.connection_status = ConnectionStatus::Closed;
            return Err(TransportError::ConnectFailed);
        }
    };
    let mut stream = stream;

    entry.state.lock().await.connection_status = ConnectionStatus::Active;

    let written = stream.write_all(request).await;
    if written.is_err() {
        tracing::warn!(device = entry.record_number, %address, "appliance transport: write failed");
        let _ = stream.shutdown().await;
        return Err(TransportError::WriteFailed);
    }
    let _ = stream.flush().await;

    let response = read_with_retries(&mut stream).await;
    let _ = stream.shutdown().await;

    match response {
        Some(bytes) => Ok(bytes),
        None => {
            tracing::warn!(device = entry.record_number, %address, "appliance transport: read timed out");
            Err(TransportError::ReadTimeout)
        }
    }
}

async fn connect_with_retries(address: &str) -> Option<TcpStream> {
    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            tokio::time::sleep(RETRY_SPACING).await;
        }
        if let Ok(Ok(stream)) = timeout(CONNECT_TIMEOUT, TcpStream::connect(address)).await {
            return Some(stream);
        }
    }
    None
}

/// Read until idle for `READ_TIMEOUT`, retrying the whole read attempt up
/// to `MAX_RETRIES` times. A zero-byte read (peer closed after sending
/// nothing) counts as a failed attempt, not a success.
async fn read_with_retries(stream: &mut TcpStream) -> Option<Vec<u8>> {
    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            tokio::time::sleep(RETRY_SPACING).await;
        }
        let mut buf = vec![0u8; 8192];
        match timeout(READ_TIMEOUT, stream.read(&mut buf)).await {
            Ok(Ok(n)) if n > 0 => {
                buf.truncate(n);
                return Some(buf);
            }
            _ => continue,
        }
    }
    None
}

fn build_post_request(body: &[u8]) -> Vec<u8> {
    let header = format!(
        "POST / HTTP/1.1\r\nUser-Agent: {USER_AGENT}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );
    let mut request = header.into_bytes();
    request.extend_from_slice(body);
    request
}

fn build_ping_request(password: &str) -> Vec<u8> {
    format!("GET /ping?password={password} HTTP/1.1\r\nUser-Agent: {USER_AGENT}\r\n\r\n").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use banner_protocol::{AddressConfig, HardwareRecordView};
    use banner_registry::DeviceRegistry;
    use tokio::net::TcpListener;

    async fn registry_with_address(address: AddressConfig) -> (DeviceRegistry, i64) {
        struct OneDeviceDb(HardwareRecordView);
        impl banner_db::HardwareDb for OneDeviceDb {
            fn lookup_hardware(
                &self,
                _record_number: i64,
            ) -> Result<Option<HardwareRecordView>, banner_db::DbError> {
                Ok(Some(self.0.clone()))
            }
            fn lookup_hardware_by_device_id(
                &self,
                _device_id: &str,
            ) -> Result<Option<HardwareRecordView>, banner_db::DbError> {
                Ok(Some(self.0.clone()))
            }
            fn list_hardware_in_kind_order(
                &self,
            ) -> Result<Vec<HardwareRecordView>, banner_db::DbError> {
                Ok(vec![self.0.clone()])
            }
            fn update_network_info(
                &self,
                _record_number: i64,
                _ip_address: &str,
            ) -> Result<(), banner_db::DbError> {
                Ok(())
            }
        }

        let db = OneDeviceDb(HardwareRecordView {
            record_number: 363,
            device_id: "appliance-363".into(),
            address,
            password: "secret".into(),
            ip_method_configured: "DHCP".into(),
            audio_group_memberships: vec![],
        });
        let registry = DeviceRegistry::build(&db, 26).unwrap();
        (registry, 363)
    }

    #[tokio::test]
    async fn no_address_returns_no_address_error() {
        let (registry, recno) = registry_with_address(AddressConfig::Auto).await;
        let entry = registry.lookup(recno).await.unwrap();
        let result = send_request(&entry, b"{}").await;
        assert!(matches!(result, Err(TransportError::NoAddress)));
    }

    #[tokio::test]
    async fn connect_failed_clears_learned_address() {
        // Port 0 never accepts; connect must fail fast in-process (not wait
        // the full 5x1s retry budget matters less than correctness here).
        let (registry, recno) =
            registry_with_address(AddressConfig::Fixed("127.0.0.1:1".into())).await;
        {
            let entry = registry.lookup(recno).await.unwrap();
            entry.state.lock().await.address_is_learned = true;
        }
        let entry = registry.lookup(recno).await.unwrap();
        let result = send_request(&entry, b"{}").await;
        assert!(matches!(result, Err(TransportError::ConnectFailed)));
        let state = entry.state.lock().await;
        assert_eq!(state.address, AddressConfig::Auto);
        assert_eq!(state.connection_status, ConnectionStatus::Closed);
    }

    #[tokio::test]
    async fn successful_round_trip_returns_response_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(b"HTTP/1.1 200 OK\r\n\r\nok").await;
        });

        let (registry, recno) =
            registry_with_address(AddressConfig::Fixed(addr.to_string())).await;
        let entry = registry.lookup(recno).await.unwrap();
        let response = send_request(&entry, b"{\"a\":1}").await.unwrap();
        assert!(String::from_utf8_lossy(&response).contains("200 OK"));
        assert_eq!(entry.state.lock().await.connection_status, ConnectionStatus::Active);
    }

    #[tokio::test]
    async fn accept_without_reply_times_out_as_read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            // Hold the connection open without ever writing a response.
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let (registry, recno) =
            registry_with_address(AddressConfig::Fixed(addr.to_string())).await;
        let entry = registry.lookup(recno).await.unwrap();
        let result = timeout(Duration::from_secs(3), async {
            // Exercise only the per-attempt read timeout shape directly,
            // since the full 5x5s retry budget is too slow for a unit test.
            let state = entry.state.lock().await;
            let address = match &state.address {
                AddressConfig::Fixed(a) => a.clone(),
                AddressConfig::Auto => unreachable!(),
            };
            drop(state);
            let mut stream = TcpStream::connect(&address).await.unwrap();
            let mut buf = vec![0u8; 64];
            tokio::time::timeout(Duration::from_millis(200), stream.read(&mut buf)).await
        })
        .await
        .unwrap();
        assert!(result.is_err(), "expected the read to time out with no reply");
    }

    #[test]
    fn post_request_has_fixed_headers_and_computed_length() {
        let request = build_post_request(b"{\"a\":1}");
        let text = String::from_utf8(request).unwrap();
        assert!(text.starts_with("POST / HTTP/1.1\r\n"));
        assert!(text.contains("Content-Type: application/json\r\n"));
        assert!(text.contains("Content-Length: 7\r\n"));
        assert!(text.ends_with("{\"a\":1}"));
    }

    #[test]
    fn ping_request_carries_password_query_param() {
        let request = build_ping_request("secret");
        let text = String::from_utf8(request).unwrap();
        assert!(text.starts_with("GET /ping?password=secret HTTP/1.1\r\n"));
    }
}
