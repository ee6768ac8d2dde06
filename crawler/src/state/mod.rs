pub mod fetch_mediator;
pub mod graph_mediator;
pub mod mediator;
pub mod pipeline;
