use std::collections::HashMap;

use crate::driver::handlers::{respond, GatewayHandler};
use crate::driver::Response;

pub async fn handle_open_connection(
    handler: &mut GatewayHandler,
    url: String,
    properties: HashMap<String, String>,
) -> Response {
    let result = handler
        .run_blocking(move |gateway| gateway.connections().open(&url, &properties))
        .await;
    if let Ok(opened) = &result {
        handler.opened.insert(opened.connection_id.clone());
    }
    respond(result, Response::Connection)
}

pub async fn handle_close_connection(
    handler: &mut GatewayHandler,
    connection_id: String,
) -> Response {
    handler.opened.remove(&connection_id);
    respond(
        handler
            .run_blocking(move |gateway| gateway.connections().close(&connection_id))
            .await,
        |_| Response::ok_empty(),
    )
}

pub async fn handle_change_catalog(
    handler: &mut GatewayHandler,
    connection_id: String,
    catalog: String,
) -> Response {
    respond(
        handler
            .run_blocking(move |gateway| {
                gateway.connections().change_catalog(&connection_id, &catalog)
            })
            .await,
        |_| Response::ok_empty(),
    )
}

pub async fn handle_set_auto_commit(
    handler: &mut GatewayHandler,
    connection_id: String,
    auto_commit: bool,
) -> Response {
    respond(
        handler
            .run_blocking(move |gateway| {
                gateway
                    .connections()
                    .set_auto_commit(&connection_id, auto_commit)
            })
            .await,
        |_| Response::ok_empty(),
    )
}

pub async fn handle_get_transaction_isolation(
    handler: &mut GatewayHandler,
    connection_id: String,
) -> Response {
    respond(
        handler
            .run_blocking(move |gateway| {
                gateway
                    .connections()
                    .get_transaction_isolation(&connection_id)
            })
            .await,
        |level| Response::Isolation { level },
    )
}

pub async fn handle_set_transaction_isolation(
    handler: &mut GatewayHandler,
    connection_id: String,
    isolation: i32,
) -> Response {
    respond(
        handler
            .run_blocking(move |gateway| {
                gateway
                    .connections()
                    .set_transaction_isolation(&connection_id, isolation)
            })
            .await,
        |_| Response::ok_empty(),
    )
}

pub async fn handle_commit(handler: &mut GatewayHandler, connection_id: String) -> Response {
    respond(
        handler
            .run_blocking(move |gateway| gateway.connections().commit(&connection_id))
            .await,
        |_| Response::ok_empty(),
    )
}

pub async fn handle_rollback(handler: &mut GatewayHandler, connection_id: String) -> Response {
    respond(
        handler
            .run_blocking(move |gateway| gateway.connections().rollback(&connection_id))
            .await,
        |_| Response::ok_empty(),
    )
}
