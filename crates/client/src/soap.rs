//! SOAP 1.1 transport for the partner API.
//!
//! Every call is a single `process` operation carrying three strings:
//! the command code, the envelope JSON and its base64 signature. The
//! response envelope JSON comes back in `processResponse/return`.

use std::io::Cursor;
use std::time::Duration;

use protocol::Transport;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

/// Namespace of the partner API operations.
pub const PARTNER_NAMESPACE: &str = "http://partnerapi.bankplus.viettel.com/";

const SOAP_ENV_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Errors raised while exchanging SOAP messages.
#[derive(Debug, Error)]
pub enum SoapError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {0}: {1}")]
    Status(u16, String),

    #[error("SOAP fault: {0}")]
    Fault(String),

    #[error("malformed XML: {0}")]
    Xml(String),

    #[error("response has no return element")]
    MissingReturn,
}

/// Sends envelopes to the partner endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct SoapTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl SoapTransport {
    /// Creates a transport with its own HTTP client.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, SoapError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, endpoint))
    }

    /// Creates a transport around an existing HTTP client.
    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Transport for SoapTransport {
    type Error = SoapError;

    async fn invoke(
        &self,
        command: &str,
        envelope: &str,
        signature: &str,
    ) -> Result<String, Self::Error> {
        let body = build_request_body(command, envelope, signature)?;
        tracing::debug!(command, endpoint = %self.endpoint, body_len = body.len(), "sending SOAP request");

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", "''")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        tracing::debug!(command, status = status.as_u16(), "received SOAP response");

        match parse_response(&text) {
            Ok(value) if status.is_success() => Ok(value),
            Err(SoapError::Fault(fault)) => Err(SoapError::Fault(fault)),
            _ if !status.is_success() => Err(SoapError::Status(status.as_u16(), text)),
            other => other,
        }
    }
}

/// Renders the SOAP request for one `process` call.
pub fn build_request_body(
    command: &str,
    envelope: &str,
    signature: &str,
) -> Result<String, SoapError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    write(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )?;
    write(
        &mut writer,
        Event::Start(
            BytesStart::new("soap:Envelope").with_attributes([("xmlns:soap", SOAP_ENV_NAMESPACE)]),
        ),
    )?;
    write(&mut writer, Event::Start(BytesStart::new("soap:Body")))?;
    write(
        &mut writer,
        Event::Start(
            BytesStart::new("ns2:process").with_attributes([("xmlns:ns2", PARTNER_NAMESPACE)]),
        ),
    )?;

    for (name, value) in [("cmd", command), ("data", envelope), ("signature", signature)] {
        if value.is_empty() {
            continue;
        }
        write(&mut writer, Event::Start(BytesStart::new(name)))?;
        write(&mut writer, Event::Text(BytesText::new(value)))?;
        write(&mut writer, Event::End(BytesEnd::new(name)))?;
    }

    write(&mut writer, Event::End(BytesEnd::new("ns2:process")))?;
    write(&mut writer, Event::End(BytesEnd::new("soap:Body")))?;
    write(&mut writer, Event::End(BytesEnd::new("soap:Envelope")))?;

    String::from_utf8(writer.into_inner().into_inner()).map_err(|e| SoapError::Xml(e.to_string()))
}

fn write(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<(), SoapError> {
    writer
        .write_event(event)
        .map_err(|e| SoapError::Xml(e.to_string()))
}

/// Where the reader currently is, by local element name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    None,
    Return,
    FaultString,
}

/// Extracts the `return` text of a `processResponse`, or the fault string.
pub fn parse_response(xml: &str) -> Result<String, SoapError> {
    let mut reader = Reader::from_str(xml);

    let mut capture = Capture::None;
    let mut returned: Option<String> = None;
    let mut fault: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                capture = match e.local_name().as_ref() {
                    b"return" => {
                        returned.get_or_insert_with(String::new);
                        Capture::Return
                    }
                    b"faultstring" => {
                        fault.get_or_insert_with(String::new);
                        Capture::FaultString
                    }
                    _ => Capture::None,
                };
            }
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"return" {
                    returned.get_or_insert_with(String::new);
                }
            }
            Ok(Event::Text(t)) => {
                let target = match capture {
                    Capture::Return => returned.as_mut(),
                    Capture::FaultString => fault.as_mut(),
                    Capture::None => None,
                };
                if let Some(target) = target {
                    let text = t.unescape().map_err(|e| SoapError::Xml(e.to_string()))?;
                    target.push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                let target = match capture {
                    Capture::Return => returned.as_mut(),
                    Capture::FaultString => fault.as_mut(),
                    Capture::None => None,
                };
                if let Some(target) = target {
                    target.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::End(_)) => capture = Capture::None,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(SoapError::Xml(format!(
                    "at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    if let Some(fault) = fault {
        return Err(SoapError::Fault(fault.trim().to_string()));
    }

    returned.ok_or(SoapError::MissingReturn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const RESPONSE_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/">
  <S:Body>
    <ns2:processResponse xmlns:ns2="http://partnerapi.bankplus.viettel.com/">
      <return>{RETURN}</return>
    </ns2:processResponse>
  </S:Body>
</S:Envelope>"#;

    const FAULT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/">
  <S:Body>
    <S:Fault>
      <faultcode>S:Server</faultcode>
      <faultstring>Service unavailable</faultstring>
    </S:Fault>
  </S:Body>
</S:Envelope>"#;

    fn response_with(value: &str) -> String {
        RESPONSE_TEMPLATE.replace("{RETURN}", value)
    }

    #[test]
    fn test_request_body_shape() {
        let body = build_request_body("VTP305", r#"{"orderId":"A"}"#, "c2ln").unwrap();

        assert!(body.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(body.contains(r#"<ns2:process xmlns:ns2="http://partnerapi.bankplus.viettel.com/">"#));
        assert!(body.contains("<cmd>VTP305</cmd>"));
        assert!(body.contains("<signature>c2ln</signature>"));
        assert!(body.contains("orderId"));
        assert!(body.ends_with("</ns2:process></soap:Body></soap:Envelope>"));
    }

    #[test]
    fn test_request_body_omits_empty_fields() {
        let body = build_request_body("VTP305", "{}", "").unwrap();
        assert!(!body.contains("<signature>"));
    }

    #[test]
    fn test_request_body_round_trips_through_parser() {
        let envelope = r#"{"data":"H4sI","note":"a < b & c"}"#;
        let body = build_request_body("VTP306", envelope, "sig")
            .unwrap()
            .replace("ns2:process", "ns2:processResponse")
            .replace("<data>", "<return>")
            .replace("</data>", "</return>");

        assert_eq!(parse_response(&body).unwrap(), envelope);
    }

    #[test]
    fn test_parse_response_unescapes_return() {
        let xml = response_with("{&quot;signature&quot;:&quot;YWJj&quot;}");
        assert_eq!(parse_response(&xml).unwrap(), r#"{"signature":"YWJj"}"#);
    }

    #[test]
    fn test_parse_response_cdata() {
        let xml = response_with(r#"<![CDATA[{"data":{}}]]>"#);
        assert_eq!(parse_response(&xml).unwrap(), r#"{"data":{}}"#);
    }

    #[test]
    fn test_parse_response_fault() {
        match parse_response(FAULT) {
            Err(SoapError::Fault(msg)) => assert_eq!(msg, "Service unavailable"),
            other => panic!("expected fault, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_response_missing_return() {
        let xml = RESPONSE_TEMPLATE.replace("<return>{RETURN}</return>", "");
        assert!(matches!(parse_response(&xml), Err(SoapError::MissingReturn)));
    }

    #[test]
    fn test_parse_response_malformed() {
        assert!(matches!(
            parse_response("<a><b></a>"),
            Err(SoapError::Xml(_))
        ));
    }

    /// Serves one canned HTTP response and hands back the raw request.
    async fn serve_once(status: &'static str, body: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/PartnerAPI", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request_complete(&request) {
                    break;
                }
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: text/xml; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });

        (url, handle)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        request.len() >= header_end + 4 + content_length
    }

    #[tokio::test]
    async fn test_invoke_over_http() {
        let (url, server) = serve_once("200 OK", response_with("{&quot;data&quot;:{}}")).await;
        let transport = SoapTransport::new(url, Duration::from_secs(5)).unwrap();

        let value = transport.invoke("VTP305", r#"{"orderId":"X"}"#, "c2ln").await.unwrap();
        assert_eq!(value, r#"{"data":{}}"#);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /PartnerAPI"));
        assert!(request.to_lowercase().contains("soapaction: ''"));
        assert!(request.contains("<cmd>VTP305</cmd>"));
    }

    #[tokio::test]
    async fn test_invoke_reports_fault_on_server_error() {
        let (url, server) = serve_once("500 Internal Server Error", FAULT.to_string()).await;
        let transport = SoapTransport::new(url, Duration::from_secs(5)).unwrap();

        let err = transport.invoke("VTP305", "{}", "c2ln").await.unwrap_err();
        assert!(matches!(err, SoapError::Fault(ref msg) if msg == "Service unavailable"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_invoke_reports_status_without_fault() {
        let (url, server) = serve_once("502 Bad Gateway", "upstream down".to_string()).await;
        let transport = SoapTransport::new(url, Duration::from_secs(5)).unwrap();

        let err = transport.invoke("VTP305", "{}", "c2ln").await.unwrap_err();
        assert!(matches!(err, SoapError::Status(502, ref body) if body == "upstream down"));
        server.await.unwrap();
    }
}
