//! Protocol Buffers messages carried by the blob operation

/// Request for `process_protobuf_async`
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProcessRequest {
    #[prost(string, tag = "1")]
    pub input_text: ::prost::alloc::string::String,
    #[prost(double, tag = "2")]
    pub number_value: f64,
    #[prost(string, repeated, tag = "3")]
    pub tags: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

/// Response delivered to the blob callback
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProcessResponse {
    #[prost(string, repeated, tag = "1")]
    pub result_strings: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(double, tag = "2")]
    pub calculated_value: f64,
    #[prost(bool, tag = "3")]
    pub success: bool,
    #[prost(string, tag = "4")]
    pub error_message: ::prost::alloc::string::String,
    /// Unix seconds when the response was produced
    #[prost(int64, tag = "5")]
    pub timestamp: i64,
}

impl ProcessRequest {
    pub fn new(input_text: impl Into<String>, number_value: f64, tags: Vec<String>) -> Self {
        Self {
            input_text: input_text.into(),
            number_value,
            tags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_request_encodes_utf8_text() {
        let request = ProcessRequest::new(
            "Protobuf测试",
            3.14159,
            vec!["tag1".into(), "tag2".into(), "protobuf".into()],
        );
        let bytes = request.encode_to_vec();
        assert_eq!(ProcessRequest::decode(bytes.as_slice()).unwrap(), request);
    }

    #[test]
    fn test_default_response_is_empty_on_wire() {
        assert!(ProcessResponse::default().encode_to_vec().is_empty());
    }
}
