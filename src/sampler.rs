use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use amf::ClassAliasRegistry;
use bytes::Bytes;
use reqwest::{
    Url,
    blocking::Client,
    header::{ACCEPT, ACCEPT_ENCODING, CACHE_CONTROL, CONTENT_TYPE},
};
use tracing::{debug, info, warn};

use crate::{
    config::{SamplerConfig, register_class_aliases},
    converter::{amf_message_to_xml, xml_to_amf_message},
    error::SamplerError,
    render::AMF_CONTENT_TYPE,
};

/// Outcome of a single AMF request.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleResult {
    pub label: String,
    pub url: String,
    /// `None` when no response was received.
    pub status: Option<u16>,
    pub successful: bool,
    pub response_message: String,
    pub content_type: Option<String>,
    pub request_data: Bytes,
    pub response_data: Bytes,
    pub elapsed: Duration,
    /// Variables set by the sample, e.g. the XML form of the response.
    pub variables: HashMap<String, String>,
}

struct HttpResponse {
    status: u16,
    reason: String,
    content_type: Option<String>,
    body: Bytes,
}

pub struct AmfSampler {
    client: Client,
    config: SamplerConfig,
}

impl AmfSampler {
    pub fn new(config: SamplerConfig, timeout: Duration) -> Result<Self, SamplerError> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .deflate(true)
            .build()?;
        register_class_aliases(&config.class_aliases);
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Encodes the configured request, posts it and records the response.
    /// Never fails: transport problems are reported in the result.
    pub fn sample(&self) -> SampleResult {
        let url = self.config.url.clone();
        let request_data = xml_to_amf_message(&self.config.amf_xml, &self.config.substitutions);
        if request_data.is_empty() {
            warn!(url, "Request message is empty, sending it anyway");
        }

        let start = Instant::now();
        let response = self.post(&url, request_data.clone());
        let elapsed = start.elapsed();

        let mut result = match response {
            Ok(response) => SampleResult {
                label: url.clone(),
                url,
                status: Some(response.status),
                successful: (200..400).contains(&response.status),
                response_message: response.reason,
                content_type: response.content_type,
                request_data,
                response_data: response.body,
                elapsed,
                variables: HashMap::new(),
            },
            Err(err) => {
                let err = anyhow::Error::new(err);
                warn!(url, "AMF request failed: {err:#}");
                SampleResult {
                    label: format!("Error: {url}"),
                    url,
                    status: None,
                    successful: false,
                    response_message: format!("{err:#}"),
                    content_type: None,
                    request_data,
                    response_data: Bytes::new(),
                    elapsed,
                    variables: HashMap::new(),
                }
            }
        };

        if let Some(var) = self.config.response_var.as_deref().filter(|var| !var.is_empty()) {
            if !result.response_data.is_empty() {
                let aliases = ClassAliasRegistry::global().snapshot();
                let xml = amf_message_to_xml(&result.response_data, &aliases);
                result.variables.insert(var.to_string(), xml);
            }
        }

        info!(
            url = result.url,
            status = result.status,
            successful = result.successful,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "AMF sample finished"
        );
        result
    }

    fn post(&self, url: &str, body: Bytes) -> Result<HttpResponse, SamplerError> {
        let url = Url::parse(url).map_err(|_| SamplerError::InvalidUrl(url.to_string()))?;
        debug!(%url, len = body.len(), "Sending AMF request");

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, AMF_CONTENT_TYPE)
            .header(CACHE_CONTROL, "no-cache")
            .header(ACCEPT, "*/*")
            .header(ACCEPT_ENCODING, "gzip, deflate")
            .body(body.to_vec())
            .send()?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes()?;

        Ok(HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod sampler_test {
    use std::{io::Read, net::TcpListener, thread};

    use amf::{ActionMessage, AliasTable, AmfValue, MessageBody};

    use super::*;

    const REQUEST_XML: &str = r#"<ActionMessage>
  <MessageBody targetUri="echo" responseUri="/1">
    <string>${greeting}</string>
  </MessageBody>
</ActionMessage>"#;

    struct ReceivedRequest {
        content_type: Option<String>,
        cache_control: Option<String>,
        body: Vec<u8>,
    }

    /// Serves a single request and hands back what it received.
    fn serve_once(
        status: u16,
        body: Vec<u8>,
    ) -> (String, thread::JoinHandle<ReceivedRequest>) {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let handle = thread::spawn(move || {
            let mut request = server.recv().unwrap();
            let header = |name: &'static str| {
                request
                    .headers()
                    .iter()
                    .find(|header| header.field.equiv(name))
                    .map(|header| header.value.as_str().to_string())
            };
            let content_type = header("Content-Type");
            let cache_control = header("Cache-Control");
            let mut received = vec![];
            request.as_reader().read_to_end(&mut received).unwrap();

            let content_type_header =
                tiny_http::Header::from_bytes(&b"Content-Type"[..], AMF_CONTENT_TYPE.as_bytes())
                    .unwrap();
            let response = tiny_http::Response::from_data(body)
                .with_status_code(status)
                .with_header(content_type_header);
            request.respond(response).unwrap();
            ReceivedRequest {
                content_type,
                cache_control,
                body: received,
            }
        });
        (format!("http://{addr}/messagebroker/amf"), handle)
    }

    fn sampler_config(url: String) -> SamplerConfig {
        SamplerConfig {
            url,
            amf_xml: REQUEST_XML.to_string(),
            substitutions: vec![crate::substitution::Substitution::new(
                "${greeting}",
                "hello",
            )],
            object_encoding: 3,
            response_var: Some("amfResponse".to_string()),
            class_aliases: vec![],
        }
    }

    fn response_message() -> Vec<u8> {
        ActionMessage {
            version: 3,
            headers: vec![],
            bodies: vec![MessageBody {
                target_uri: "/1/onResult".to_string(),
                response_uri: "".to_string(),
                value: AmfValue::from("hello"),
            }],
        }
        .serialize()
        .unwrap()
        .to_vec()
    }

    #[test]
    fn test_successful_sample() {
        let (url, server) = serve_once(200, response_message());
        let sampler = AmfSampler::new(sampler_config(url.clone()), Duration::from_secs(10)).unwrap();
        let result = sampler.sample();
        let received = server.join().unwrap();

        assert_eq!(received.content_type.as_deref(), Some(AMF_CONTENT_TYPE));
        assert_eq!(received.cache_control.as_deref(), Some("no-cache"));
        let request = ActionMessage::parse(Bytes::from(received.body), &AliasTable::default()).unwrap();
        assert_eq!(request.bodies[0].value, AmfValue::from("hello"));

        assert_eq!(result.label, url);
        assert_eq!(result.status, Some(200));
        assert!(result.successful);
        assert_eq!(result.response_message, "OK");
        assert_eq!(result.content_type.as_deref(), Some(AMF_CONTENT_TYPE));
        assert_eq!(result.response_data.as_ref(), response_message().as_slice());

        let xml = &result.variables["amfResponse"];
        assert!(xml.contains("<string>hello</string>"));
    }

    #[test]
    fn test_server_error_is_unsuccessful() {
        let (url, server) = serve_once(500, vec![]);
        let sampler = AmfSampler::new(sampler_config(url), Duration::from_secs(10)).unwrap();
        let result = sampler.sample();
        server.join().unwrap();

        assert_eq!(result.status, Some(500));
        assert!(!result.successful);
        assert_eq!(result.response_message, "Internal Server Error");
        assert!(result.variables.is_empty());
    }

    #[test]
    fn test_connection_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{port}/amf");
        let sampler = AmfSampler::new(sampler_config(url.clone()), Duration::from_secs(5)).unwrap();
        let result = sampler.sample();

        assert_eq!(result.label, format!("Error: {url}"));
        assert_eq!(result.status, None);
        assert!(!result.successful);
        assert!(!result.response_message.is_empty());
        assert!(result.variables.is_empty());
    }

    #[test]
    fn test_invalid_url() {
        let sampler =
            AmfSampler::new(sampler_config("not a url".to_string()), Duration::from_secs(1)).unwrap();
        let result = sampler.sample();

        assert_eq!(result.label, "Error: not a url");
        assert!(!result.successful);
        assert!(!result.request_data.is_empty());
    }
}
