use super::*;
use axum::{extract::State, routing::post, Json, Router};
use shared::error::{RpcErrorObject, USER_REJECTED_REQUEST};
use tokio::{net::TcpListener, sync::Mutex};

use crate::{config::ClientConfig, SessionCoordinator, SessionError, TicketLinks};

const ACCOUNT: &str = "0x1111111111111111111111111111111111111111";
const OTHER_ACCOUNT: &str = "0x2222222222222222222222222222222222222222";
const CONTRACT: &str = "0x52aaeeb1ac34415b434ba7101a5ce34fdd1045ea";

/// Scripted reply for a request, given how many earlier requests used the
/// same method.
type Responder = dyn Fn(&RpcRequest, usize) -> std::result::Result<Value, RpcErrorObject>
    + Send
    + Sync;

#[derive(Clone)]
struct RpcServerState {
    requests: Arc<Mutex<Vec<RpcRequest>>>,
    responder: Arc<Responder>,
}

async fn handle_rpc(
    State(state): State<RpcServerState>,
    Json(request): Json<RpcRequest>,
) -> Json<RpcResponse> {
    let seen = {
        let mut requests = state.requests.lock().await;
        let seen = requests
            .iter()
            .filter(|earlier| earlier.method == request.method)
            .count();
        requests.push(request.clone());
        seen
    };
    Json(match (state.responder)(&request, seen) {
        Ok(result) => RpcResponse::success(request.id, result),
        Err(error) => RpcResponse::failure(request.id, error),
    })
}

async fn spawn_rpc_server(
    responder: impl Fn(&RpcRequest, usize) -> std::result::Result<Value, RpcErrorObject>
        + Send
        + Sync
        + 'static,
) -> Result<(Url, Arc<Mutex<Vec<RpcRequest>>>)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state = RpcServerState {
        requests: Arc::clone(&requests),
        responder: Arc::new(responder),
    };
    let app = Router::new()
        .route("/", post(handle_rpc))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((Url::parse(&format!("http://{addr}/"))?, requests))
}

fn transport(url: &Url) -> Arc<JsonRpcTransport> {
    Arc::new(JsonRpcTransport::new(Client::new(), url.clone()))
}

fn address(raw: &str) -> Address {
    raw.parse().expect("address")
}

fn contract_arg(request: &RpcRequest) -> &Value {
    &request.params[0]
}

async fn bound_contract(url: &Url) -> Arc<dyn TicketContract> {
    let wallet = RpcWalletProvider::new(transport(url));
    let signer = wallet
        .signing_capability(address(ACCOUNT))
        .await
        .expect("signer");
    RpcContractConnector::new(transport(url), Duration::from_millis(10))
        .bind(address(CONTRACT), signer)
}

fn unknown_method(request: &RpcRequest) -> RpcErrorObject {
    RpcErrorObject::new(-32601, format!("method not found: {}", request.method))
}

#[tokio::test]
async fn wallet_uses_first_approved_account() {
    let (url, requests) = spawn_rpc_server(|request, _| match request.method.as_str() {
        methods::REQUEST_ACCOUNTS => Ok(json!([ACCOUNT, OTHER_ACCOUNT])),
        _ => Err(unknown_method(request)),
    })
    .await
    .expect("spawn server");

    let wallet = RpcWalletProvider::new(transport(&url));
    assert!(wallet.is_available());
    assert_eq!(
        wallet.request_accounts().await.expect("accounts"),
        address(ACCOUNT)
    );

    let requests = requests.lock().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].jsonrpc, "2.0");
    assert_eq!(requests[0].params, json!([]));
}

#[tokio::test]
async fn wallet_without_accounts_is_an_error() {
    let (url, _) = spawn_rpc_server(|_, _| Ok(json!([])))
        .await
        .expect("spawn server");

    let err = RpcWalletProvider::new(transport(&url))
        .request_accounts()
        .await
        .expect_err("no accounts");
    assert!(err.to_string().contains("no accounts"));
}

#[tokio::test]
async fn rpc_error_object_is_returned_as_rpc_exception() {
    let (url, _) = spawn_rpc_server(|_, _| {
        Err(RpcErrorObject::new(
            USER_REJECTED_REQUEST,
            "User rejected the request.",
        ))
    })
    .await
    .expect("spawn server");

    let err = transport(&url)
        .call::<Vec<Address>>(methods::REQUEST_ACCOUNTS, json!([]))
        .await
        .expect_err("rejected");
    let rpc = err.downcast_ref::<RpcException>().expect("rpc exception");
    assert!(rpc.is_user_rejection());
    assert_eq!(rpc.message, "User rejected the request.");
}

#[tokio::test]
async fn contract_reads_use_abi_method_names_and_argument_order() {
    let (url, requests) = spawn_rpc_server(|request, _| {
        match contract_arg(request)["method"].as_str() {
            Some("hasRole") => Ok(json!(true)),
            Some("getTokenURIsForOwner") => Ok(json!(["1", 2])),
            Some("tokenURI") => Ok(json!("ipfs://QmTwo")),
            _ => Err(unknown_method(request)),
        }
    })
    .await
    .expect("spawn server");
    let contract = bound_contract(&url).await;
    let role = RoleHash::from_role_name("ORGANIZER_ROLE");

    assert!(contract
        .has_role(role, address(ACCOUNT))
        .await
        .expect("has role"));
    assert_eq!(
        contract
            .token_ids_for_owner(address(ACCOUNT))
            .await
            .expect("tokens"),
        vec![TokenId::new("1").expect("id"), TokenId::new("2").expect("id")]
    );
    assert_eq!(
        contract
            .token_uri(&TokenId::new("2").expect("id"))
            .await
            .expect("uri"),
        "ipfs://QmTwo"
    );

    let requests = requests.lock().await;
    assert!(requests
        .iter()
        .all(|request| request.method == methods::CONTRACT_CALL));
    assert_eq!(
        contract_arg(&requests[0]),
        &json!({
            "to": CONTRACT,
            "method": "hasRole",
            "args": [role.to_string(), ACCOUNT],
        })
    );
    assert_eq!(contract_arg(&requests[1])["args"], json!([ACCOUNT]));
    assert_eq!(contract_arg(&requests[2])["args"], json!(["2"]));
}

#[tokio::test]
async fn malformed_enumeration_entry_is_rejected() {
    let (url, _) = spawn_rpc_server(|_, _| Ok(json!(["1", {"id": 2}])))
        .await
        .expect("spawn server");
    let contract = bound_contract(&url).await;

    let err = contract
        .token_ids_for_owner(address(ACCOUNT))
        .await
        .expect_err("malformed");
    assert!(format!("{err:#}").contains("unexpected token id"));
}

#[tokio::test]
async fn mint_is_signed_by_wallet_and_polls_receipt_until_mined() {
    let (url, requests) = spawn_rpc_server(|request, seen| match request.method.as_str() {
        methods::SEND_TRANSACTION => Ok(json!("0xabc")),
        methods::GET_TRANSACTION_RECEIPT if seen < 2 => Ok(Value::Null),
        methods::GET_TRANSACTION_RECEIPT => Ok(json!({"status": "success", "blockNumber": 7})),
        _ => Err(unknown_method(request)),
    })
    .await
    .expect("spawn server");
    let contract = bound_contract(&url).await;

    let pending = contract
        .mint_nft(
            address(ACCOUNT),
            &TokenId::new("42").expect("id"),
            "ipfs://Qm123",
        )
        .await
        .expect("submit");
    assert_eq!(pending.tx_hash(), &TxHash("0xabc".into()));
    assert_eq!(
        pending.await_confirmation().await.expect("confirmation"),
        TxOutcome::Confirmed
    );

    let requests = requests.lock().await;
    assert_eq!(requests[0].method, methods::SEND_TRANSACTION);
    assert_eq!(
        requests[0].params,
        json!([{
            "from": ACCOUNT,
            "to": CONTRACT,
            "method": "mintNFT",
            "args": [ACCOUNT, "42", "ipfs://Qm123"],
        }])
    );
    let receipt_polls: Vec<_> = requests
        .iter()
        .filter(|request| request.method == methods::GET_TRANSACTION_RECEIPT)
        .collect();
    assert_eq!(receipt_polls.len(), 3);
    assert!(receipt_polls
        .iter()
        .all(|request| request.params == json!(["0xabc"])));
}

#[tokio::test]
async fn reverted_receipt_carries_reason() {
    let (url, _) = spawn_rpc_server(|request, _| match request.method.as_str() {
        methods::SEND_TRANSACTION => Ok(json!("0xdef")),
        methods::GET_TRANSACTION_RECEIPT => Ok(json!({
            "status": "reverted",
            "revertReason": "AccessControl: missing role",
        })),
        _ => Err(unknown_method(request)),
    })
    .await
    .expect("spawn server");
    let contract = bound_contract(&url).await;

    let pending = contract
        .update_metadata(&TokenId::new("5").expect("id"), "ipfs://QmNew")
        .await
        .expect("submit");
    assert_eq!(
        pending.await_confirmation().await.expect("receipt"),
        TxOutcome::Reverted {
            reason: "AccessControl: missing role".into()
        }
    );
}

fn client_config(wallet_url: Option<Url>, chain_url: Url) -> ClientConfig {
    ClientConfig {
        contract_address: address(CONTRACT),
        chain_rpc_url: chain_url,
        wallet_url,
        ticket_links: TicketLinks::new(Url::parse("https://tickets.example.org").expect("url")),
        confirmation_poll_interval: Duration::from_millis(10),
        request_timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn rejected_account_request_surfaces_as_connection_rejected() {
    let (url, requests) = spawn_rpc_server(|_, _| {
        Err(RpcErrorObject::new(
            USER_REJECTED_REQUEST,
            "User rejected the request.",
        ))
    })
    .await
    .expect("spawn server");
    let client = SessionCoordinator::from_config(&client_config(Some(url.clone()), url))
        .expect("coordinator");

    let err = client.establish_session().await.expect_err("rejected");

    assert_eq!(
        err,
        SessionError::ConnectionRejected("User rejected the request.".into())
    );
    assert_eq!(requests.lock().await.len(), 1);
}

#[tokio::test]
async fn missing_wallet_url_means_no_wallet() {
    let (url, requests) = spawn_rpc_server(|_, _| Ok(Value::Null))
        .await
        .expect("spawn server");
    let client = SessionCoordinator::from_config(&client_config(None, url)).expect("coordinator");

    assert_eq!(
        client.establish_session().await,
        Err(SessionError::NoWallet)
    );
    assert!(requests.lock().await.is_empty());
}

#[tokio::test]
async fn session_and_mint_over_json_rpc() {
    let (url, requests) = spawn_rpc_server(|request, seen| match request.method.as_str() {
        methods::REQUEST_ACCOUNTS => Ok(json!([ACCOUNT])),
        methods::SEND_TRANSACTION => Ok(json!("0x42")),
        methods::GET_TRANSACTION_RECEIPT => Ok(json!({"status": "success"})),
        methods::CONTRACT_CALL => match contract_arg(request)["method"].as_str() {
            Some("hasRole") => Ok(json!(false)),
            Some("getTokenURIsForOwner") if seen <= 1 => Ok(json!([])),
            Some("getTokenURIsForOwner") => Ok(json!(["42"])),
            _ => Err(unknown_method(request)),
        },
        _ => Err(unknown_method(request)),
    })
    .await
    .expect("spawn server");
    let client = SessionCoordinator::from_config(&client_config(Some(url.clone()), url))
        .expect("coordinator");

    let snapshot = client.establish_session().await.expect("session");
    assert!(!snapshot.is_authorized_organizer);
    assert!(client.view().tokens.is_empty());

    client.mint_token("42", "Qm123").await.expect("mint");
    assert!(client
        .view()
        .contains_token(&TokenId::new("42").expect("id")));

    let err = client
        .update_metadata("42", "QmNew")
        .await
        .expect_err("not organizer");
    assert_eq!(err, SessionError::NotAuthorized);

    let requests = requests.lock().await;
    assert!(!requests.iter().any(|request| {
        request.method == methods::SEND_TRANSACTION
            && request.params[0]["method"] == json!("updateMetadata")
    }));
}
