use sqlbridge_client::protocol::ParameterType;

use crate::driver::handlers::{respond, GatewayHandler};
use crate::driver::Response;

pub async fn handle_create_statement(
    handler: &mut GatewayHandler,
    connection_id: String,
    sql: String,
) -> Response {
    respond(
        handler
            .run_blocking(move |gateway| gateway.statements().create(&connection_id, &sql))
            .await,
        |statement_id| Response::Statement { statement_id },
    )
}

pub async fn handle_set_parameter(
    handler: &mut GatewayHandler,
    statement_id: String,
    index: i32,
    param_type: ParameterType,
    value: String,
) -> Response {
    respond(
        handler
            .run_blocking(move |gateway| {
                gateway
                    .statements()
                    .set_parameter(&statement_id, index, param_type, &value)
            })
            .await,
        |_| Response::ok_empty(),
    )
}

pub async fn handle_execute_statement(
    handler: &mut GatewayHandler,
    statement_id: String,
    fetch_size: i32,
) -> Response {
    respond(
        handler
            .run_blocking(move |gateway| gateway.statements().execute(&statement_id, fetch_size))
            .await,
        Response::Executed,
    )
}

/// Runs inline: setting the cancel flag never waits on the statement
pub fn handle_cancel_statement(handler: &mut GatewayHandler, statement_id: String) -> Response {
    respond(
        handler.gateway.statements().cancel(&statement_id),
        |_| Response::ok_empty(),
    )
}

pub async fn handle_close_statement(
    handler: &mut GatewayHandler,
    statement_id: String,
) -> Response {
    respond(
        handler
            .run_blocking(move |gateway| gateway.statements().close(&statement_id))
            .await,
        |_| Response::ok_empty(),
    )
}
