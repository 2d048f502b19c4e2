//! Action dispatch.
//!
//! Maps a [`Request`] onto exactly one collaborator call. Single-call
//! actions go through [`RpcClient::call`] with their verb; free-form
//! batches go through [`RpcClient::free_form`]. Nothing here retries.

use fmg_rpc_common::payload::DATA_KEY;
use fmg_rpc_common::{ConnectorError, ConnectorResult, Payload, RpcClient, RpcReply};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::request::Request;

/// Returns the sub-requests of a free-form batch.
///
/// Fails unless `payload["data"]` is a non-empty list.
pub fn batch_items(payload: &Payload) -> ConnectorResult<&[Value]> {
    match payload.get(DATA_KEY) {
        Some(Value::Array(items)) if !items.is_empty() => Ok(items.as_slice()),
        Some(Value::Array(_)) => Err(ConnectorError::invalid_shape("Payload list is empty")),
        _ => Err(ConnectorError::invalid_shape("Payload must be a list")),
    }
}

/// Returns the `url` of the first sub-request, if any.
pub fn batch_url(payload: &Payload) -> Option<&str> {
    payload
        .get(DATA_KEY)?
        .as_array()?
        .first()?
        .get("url")?
        .as_str()
        .filter(|url| !url.is_empty())
}

/// Sends `request` to the controller.
#[instrument(skip(client, request), fields(action = %request.action, url = %request.url))]
pub async fn dispatch<C>(client: &C, request: &Request) -> ConnectorResult<RpcReply>
where
    C: RpcClient + ?Sized,
{
    let reply = match request.action.rpc_method() {
        Some(method) => client.call(method, &request.url, &request.payload).await?,
        None => {
            let method = request
                .method
                .as_deref()
                .ok_or_else(|| ConnectorError::missing_parameter("method"))?;
            let items = batch_items(&request.payload)?;
            debug!(method, items = items.len(), "Sending free-form batch");
            client.free_form(method, &request.payload).await?
        }
    };

    debug!(code = reply.code, "Dispatched");
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use fmg_rpc_common::codes;
    use fmg_rpc_test::address_fixtures::{add_host_params, batch_add_params, host_url_params};
    use fmg_rpc_test::{params, FakeFmg, ADDRESS_URL};
    use serde_json::json;

    #[test]
    fn test_batch_items_shape() {
        let ok = params(json!({"data": [{"url": "/a"}]}));
        assert_eq!(batch_items(&ok).unwrap().len(), 1);

        let empty = params(json!({"data": []}));
        assert!(matches!(batch_items(&empty), Err(ConnectorError::InvalidPayloadShape { .. })));

        let object = params(json!({"data": {"url": "/a"}}));
        let err = batch_items(&object).unwrap_err();
        assert_eq!(err.to_string(), "Invalid payload shape: Payload must be a list");
    }

    #[test]
    fn test_batch_url() {
        assert_eq!(batch_url(&params(json!({"data": [{"url": "/a"}, {"url": "/b"}]}))), Some("/a"));
        assert_eq!(batch_url(&params(json!({"data": [{"data": {}}]}))), None);
        assert_eq!(batch_url(&params(json!({}))), None);
    }

    #[tokio::test]
    async fn test_single_call_routes_by_action() {
        let fmg = FakeFmg::new();
        let session = fmg.session();

        let add = Request::from_params(Action::Add, &add_host_params("host-1", "1.2.3.4")).unwrap();
        let reply = dispatch(&session, &add).await.unwrap();
        assert_eq!(reply.code, codes::OK);
        assert_eq!(reply.data, json!({"name": "host-1"}));

        let get = Request::from_params(Action::Get, &host_url_params("host-1")).unwrap();
        let reply = dispatch(&session, &get).await.unwrap();
        assert_eq!(reply.data["subnet"][0], json!("1.2.3.4"));

        assert_eq!(
            fmg.session_calls(session.id()),
            vec![
                format!("add {}", ADDRESS_URL),
                format!("get {}host-1", ADDRESS_URL),
            ]
        );
    }

    #[tokio::test]
    async fn test_non_zero_codes_pass_through() {
        let fmg = FakeFmg::new();
        let session = fmg.session();

        let get = Request::from_params(Action::Get, &host_url_params("missing")).unwrap();
        let reply = dispatch(&session, &get).await.unwrap();

        assert_eq!(reply.code, fmg_rpc_test::OBJECT_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_free_form_batch() {
        let fmg = FakeFmg::new();
        let session = fmg.session();
        let request = Request::from_params(
            Action::FreeForm,
            &batch_add_params(&[("a", "10.0.0.1"), ("b", "10.0.0.2")]),
        )
        .unwrap();

        let reply = dispatch(&session, &request).await.unwrap();

        assert_eq!(reply.code, codes::HTTP_OK);
        let results = reply.data.as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1]["status"]["code"], json!(0));
        assert!(fmg.object(&format!("{}b", ADDRESS_URL)).is_some());
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces() {
        let fmg = FakeFmg::new();
        fmg.fail_url(ADDRESS_URL);
        let session = fmg.session();
        let request = Request::from_params(Action::Add, &add_host_params("host-1", "1.2.3.4")).unwrap();

        let err = dispatch(&session, &request).await.unwrap_err();

        assert!(matches!(err, ConnectorError::RemoteCallFailed { .. }));
        assert_eq!(fmg.count("add", ADDRESS_URL), 1);
    }
}
