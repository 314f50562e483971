use crate::driver::handlers::{respond, GatewayHandler};
use crate::driver::Response;

pub async fn handle_get_tables(
    handler: &mut GatewayHandler,
    connection_id: String,
    catalog: String,
    schema_pattern: String,
    table_name_pattern: String,
    types: Vec<String>,
) -> Response {
    respond(
        handler
            .run_blocking(move |gateway| {
                gateway.metadata().get_tables(
                    &connection_id,
                    &catalog,
                    &schema_pattern,
                    &table_name_pattern,
                    &types,
                )
            })
            .await,
        Response::ResultSet,
    )
}

pub async fn handle_get_catalogs(handler: &mut GatewayHandler, connection_id: String) -> Response {
    respond(
        handler
            .run_blocking(move |gateway| gateway.metadata().get_catalogs(&connection_id))
            .await,
        Response::ResultSet,
    )
}

pub async fn handle_get_procedures(
    handler: &mut GatewayHandler,
    connection_id: String,
    catalog: String,
    schema_pattern: String,
    procedure_name_pattern: String,
) -> Response {
    respond(
        handler
            .run_blocking(move |gateway| {
                gateway.metadata().get_procedures(
                    &connection_id,
                    &catalog,
                    &schema_pattern,
                    &procedure_name_pattern,
                )
            })
            .await,
        Response::ResultSet,
    )
}

pub async fn handle_get_functions(
    handler: &mut GatewayHandler,
    connection_id: String,
    catalog: String,
    schema_pattern: String,
    function_name_pattern: String,
) -> Response {
    respond(
        handler
            .run_blocking(move |gateway| {
                gateway.metadata().get_functions(
                    &connection_id,
                    &catalog,
                    &schema_pattern,
                    &function_name_pattern,
                )
            })
            .await,
        Response::ResultSet,
    )
}

pub async fn handle_is_read_only(handler: &mut GatewayHandler, connection_id: String) -> Response {
    respond(
        handler
            .run_blocking(move |gateway| gateway.metadata().is_read_only(&connection_id))
            .await,
        |value| Response::Flag { value },
    )
}

pub async fn handle_supports_group_by(
    handler: &mut GatewayHandler,
    connection_id: String,
) -> Response {
    respond(
        handler
            .run_blocking(move |gateway| gateway.metadata().supports_group_by(&connection_id))
            .await,
        |value| Response::Flag { value },
    )
}
