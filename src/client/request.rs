//! Outgoing request abstraction.

use std::sync::Arc;

use http::header::CONTENT_LENGTH;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};

use crate::client::entity::Entity;
use crate::config::properties::{Properties, PropertyChain, PropertyValue, SystemProperties};

/// A request as handed to a connector.
///
/// Carries its own property bag plus the client and system layers it was
/// created from, so the connector can resolve settings along the full chain.
#[derive(Debug)]
pub struct ClientRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    properties: Properties,
    client_properties: Arc<Properties>,
    system_properties: Arc<SystemProperties>,
    entity: Option<Entity>,
}

impl ClientRequest {
    /// A request outside any client: only its own property layer exists.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self::scoped(
            method,
            uri,
            Arc::default(),
            Arc::default(),
            HeaderMap::new(),
        )
    }

    pub(crate) fn scoped(
        method: Method,
        uri: Uri,
        client_properties: Arc<Properties>,
        system_properties: Arc<SystemProperties>,
        headers: HeaderMap,
    ) -> Self {
        Self {
            method,
            uri,
            headers,
            properties: Properties::new(),
            client_properties,
            system_properties,
            entity: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Append a header value; earlier values of the same name are kept.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Request-level properties, the highest layer of the chain.
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.set(key, value);
        self
    }

    /// Lookup chain in precedence order: request, client, system.
    pub fn resolver(&self) -> PropertyChain<'_> {
        PropertyChain::new()
            .then(&self.properties)
            .then(&*self.client_properties)
            .then(&*self.system_properties)
    }

    pub fn body(mut self, entity: Entity) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn set_entity(&mut self, entity: Entity) {
        self.entity = Some(entity);
    }

    pub fn entity(&self) -> Option<&Entity> {
        self.entity.as_ref()
    }

    pub fn has_entity(&self) -> bool {
        self.entity.is_some()
    }

    pub(crate) fn take_entity(&mut self) -> Option<Entity> {
        self.entity.take()
    }

    /// Length declared by an explicit `Content-Length` header.
    pub fn declared_length(&self) -> Option<u64> {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PropertySource;

    #[test]
    fn test_headers_keep_every_value_in_order() {
        let request = ClientRequest::new(Method::GET, Uri::from_static("http://localhost/"))
            .header(HeaderName::from_static("x-tag"), HeaderValue::from_static("a"))
            .header(HeaderName::from_static("x-tag"), HeaderValue::from_static("b"));

        let values: Vec<_> = request.headers().get_all("x-tag").iter().collect();
        assert_eq!(values, ["a", "b"]);
    }

    #[test]
    fn test_request_layer_shadows_client_layer() {
        let client = Arc::new(Properties::new().with("k", "client").with("only", "client"));
        let request = ClientRequest::scoped(
            Method::GET,
            Uri::from_static("http://localhost/"),
            client,
            Arc::default(),
            HeaderMap::new(),
        )
        .property("k", "request");

        let resolver = request.resolver();
        assert_eq!(resolver.property("k").and_then(PropertyValue::as_str), Some("request"));
        assert_eq!(resolver.property("only").and_then(PropertyValue::as_str), Some("client"));
    }

    #[test]
    fn test_declared_length() {
        let request = ClientRequest::new(Method::POST, Uri::from_static("http://localhost/"))
            .header(CONTENT_LENGTH, HeaderValue::from_static("42"));
        assert_eq!(request.declared_length(), Some(42));
    }
}
