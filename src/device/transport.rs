//! HTTP transport to the receiver's web API

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::session::DeviceSession;
use crate::error::{DeviceError, DeviceResult};

/// Raw request/response access to one device.
///
/// Paths are absolute (`/goform/...`) and may carry a query string.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, path: &str) -> DeviceResult<String>;

    async fn post(&self, path: &str, body: String) -> DeviceResult<String>;
}

/// reqwest-backed transport.
///
/// Generation 2 devices serve HTTPS with a self-signed certificate, which is
/// accepted for that generation only.
pub struct HttpTransport {
    client: Client,
    base: Url,
}

impl HttpTransport {
    pub fn new(session: &DeviceSession) -> DeviceResult<Self> {
        let tls = session.generation().uses_tls();
        let scheme = if tls { "https" } else { "http" };
        let base = Url::parse(&format!("{}://{}:{}", scheme, session.host(), session.port()))
            .map_err(|e| DeviceError::Transport(format!("invalid device address: {}", e)))?;

        let client = Client::builder()
            .timeout(session.timeout())
            .danger_accept_invalid_certs(tls)
            .build()?;

        Ok(Self { client, base })
    }

    fn url(&self, path: &str) -> DeviceResult<Url> {
        self.base
            .join(path)
            .map_err(|e| DeviceError::Transport(format!("invalid path {}: {}", path, e)))
    }

    async fn read(path: &str, response: reqwest::Response) -> DeviceResult<String> {
        let status = response.status();
        if !status.is_success() {
            return Err(DeviceError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }
        let body = response.text().await?;
        debug!(path, bytes = body.len(), "Device response");
        Ok(body)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str) -> DeviceResult<String> {
        let url = self.url(path)?;
        debug!(%url, "Device GET");
        let response = self.client.get(url).send().await?;
        Self::read(path, response).await
    }

    async fn post(&self, path: &str, body: String) -> DeviceResult<String> {
        let url = self.url(path)?;
        debug!(%url, body = %body, "Device POST");
        let response = self
            .client
            .post(url)
            .header("Content-Type", "text/xml")
            .body(body)
            .send()
            .await?;
        Self::read(path, response).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::session::{command_path, Generation};
    use denon_events::Zone;

    fn session_for(server: &mockito::Server) -> DeviceSession {
        let addr = server.host_with_port();
        let (host, port) = addr.rsplit_once(':').unwrap();
        DeviceSession::new(host, port.parse().unwrap(), Generation::Gen1, Zone::Main)
    }

    #[tokio::test]
    async fn test_get_returns_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/goform/Deviceinfo.xml")
            .with_status(200)
            .with_body("<Device_Info/>")
            .create_async()
            .await;

        let transport = HttpTransport::new(&session_for(&server)).unwrap();
        let body = transport.get("/goform/Deviceinfo.xml").await.unwrap();

        assert_eq!(body, "<Device_Info/>");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/goform/formZone2_Zone2XmlStatusLite.xml")
            .with_status(503)
            .create_async()
            .await;

        let transport = HttpTransport::new(&session_for(&server)).unwrap();
        let err = transport
            .get("/goform/formZone2_Zone2XmlStatusLite.xml")
            .await
            .unwrap_err();

        assert!(matches!(err, DeviceError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_command_reaches_send_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/goform/formiPhoneAppDirect.xml")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .create_async()
            .await;

        let transport = HttpTransport::new(&session_for(&server)).unwrap();
        transport.get(&command_path("MVUP")).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_sends_envelope() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/goform/AppCommand.xml")
            .match_body(mockito::Matcher::Regex("GetPictureMode".into()))
            .with_status(200)
            .with_body("<rx><cmd><value>2</value></cmd></rx>")
            .create_async()
            .await;

        let transport = HttpTransport::new(&session_for(&server)).unwrap();
        let reply = transport
            .post("/goform/AppCommand.xml", "<tx><cmd id='1'>GetPictureMode</cmd></tx>".into())
            .await
            .unwrap();

        assert!(reply.contains("<value>2</value>"));
        mock.assert_async().await;
    }
}
