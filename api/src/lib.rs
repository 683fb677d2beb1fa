// Module layout (Clean Architecture style)
// - bootstrap: configuration, telemetry and service wiring
// - infrastructure: database, object storage and email adapters
// - presentation: HTTP handlers, middleware and routing
// - application: ports, services and use cases
// - domain: core models
// - orchestration: dependency-gated stack bring-up
// - loadtest: synthetic traffic against a running deployment

pub mod application;
pub mod bootstrap;
pub mod domain;
pub mod infrastructure;
pub mod loadtest;
pub mod orchestration;
pub mod presentation;
