use crate::driver::handlers::{respond, GatewayHandler};
use crate::driver::Response;

pub async fn handle_read_result_set(
    handler: &mut GatewayHandler,
    result_set_id: String,
    chunk_size: i32,
) -> Response {
    respond(
        handler
            .run_blocking(move |gateway| gateway.read_result_set(&result_set_id, chunk_size))
            .await,
        |frame| match frame {
            Some(frame) => Response::chunk(frame.rows, frame.is_completed),
            None => Response::Completed,
        },
    )
}

pub async fn handle_close_result_set(
    handler: &mut GatewayHandler,
    result_set_id: String,
) -> Response {
    respond(
        handler
            .run_blocking(move |gateway| gateway.close_result_set(&result_set_id))
            .await,
        |_| Response::ok_empty(),
    )
}
