//! Handler configuration

use super::batch::BatchBuilder;
use super::error::{Result, ShipperError};
use super::formatter::{FieldMapping, Formatter};
use super::overflow_policy::OverflowPolicy;
use super::retry::RetryPolicy;
use super::template::Template;
use super::timestamp::TimestampFormat;
use super::value::FieldValue;
use crate::transport::http::{bulk_url, BasicAuth, HttpTransportConfig};
use std::collections::BTreeMap;
use std::time::Duration;

/// Everything a [`Handler`](super::Handler) is built from
///
/// Usually assembled through [`HandlerBuilder`](super::HandlerBuilder).
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Base URLs of the bulk endpoint; requests go to `<host>/_bulk`
    pub hosts: Vec<String>,
    /// Index name template, e.g. `logs-{time:%Y.%m.%d}`
    pub index: String,
    /// Document type template; `_type` is omitted when unset
    pub doc_type: Option<String>,
    /// Output field -> attribute mapping. `None` ships every attribute.
    pub fields: Option<FieldMapping>,
    pub time_field: String,
    pub time_format: TimestampFormat,
    /// Added to every record; event attributes win on collision
    pub static_fields: BTreeMap<String, FieldValue>,
    pub queue_capacity: usize,
    pub bulk_size: usize,
    /// Idle period after which pooled connections are dropped
    pub session_timeout: Option<Duration>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub overflow_policy: OverflowPolicy,
    pub retry: RetryPolicy,
    pub compression: bool,
    pub basic_auth: Option<BasicAuth>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        let transport = HttpTransportConfig::default();
        Self {
            hosts: transport.hosts,
            index: String::new(),
            doc_type: None,
            fields: None,
            time_field: "time".to_string(),
            time_format: TimestampFormat::Unix,
            static_fields: BTreeMap::new(),
            queue_capacity: 512,
            bulk_size: 512,
            session_timeout: Some(Duration::from_secs(5)),
            connect_timeout: transport.connect_timeout,
            request_timeout: transport.request_timeout,
            overflow_policy: OverflowPolicy::Drop,
            retry: RetryPolicy::default(),
            compression: transport.compression,
            basic_auth: transport.basic_auth,
        }
    }
}

impl HandlerConfig {
    /// Check everything that can be checked without talking to the endpoint.
    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return Err(ShipperError::config("hosts", "at least one host is required"));
        }
        for host in &self.hosts {
            bulk_url(host)?;
        }
        if self.time_field.is_empty() {
            return Err(ShipperError::config("time_field", "must not be empty"));
        }
        if !self.time_format.is_valid() {
            return Err(ShipperError::config(
                "time_format",
                format!("{:?} is not a usable strftime format", self.time_format),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ShipperError::config("queue_capacity", "must be at least 1"));
        }
        if self.bulk_size == 0 {
            return Err(ShipperError::config("bulk_size", "must be at least 1"));
        }
        if self.request_timeout.is_zero() {
            return Err(ShipperError::config("request_timeout", "must be non-zero"));
        }
        if let Some(mapping) = &self.fields {
            if mapping.is_empty() {
                return Err(ShipperError::config("fields", "mapping has no entries"));
            }
        }
        self.batch_builder().map(|_| ())
    }

    /// Parse the index and doctype templates into a batch builder.
    pub fn batch_builder(&self) -> Result<BatchBuilder> {
        if self.index.is_empty() {
            return Err(ShipperError::config("index", "an index template is required"));
        }
        let index = self.template(&self.index)?;
        let doc_type = match &self.doc_type {
            Some(source) => Some(self.template(source)?),
            None => None,
        };
        Ok(BatchBuilder::new(index, doc_type, self.bulk_size))
    }

    pub fn formatter(&self) -> Formatter {
        let formatter = Formatter::new(self.time_field.clone(), self.time_format.clone())
            .with_static_fields(self.static_fields.clone());
        match &self.fields {
            Some(mapping) => formatter.with_mapping(mapping.clone()),
            None => formatter,
        }
    }

    pub fn transport_config(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            hosts: self.hosts.clone(),
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
            compression: self.compression,
            basic_auth: self.basic_auth.clone(),
        }
    }

    fn template(&self, source: &str) -> Result<Template> {
        let template = Template::parse(source)?;
        template.validate_time_patterns(&self.time_field)?;
        Ok(template)
    }
}
