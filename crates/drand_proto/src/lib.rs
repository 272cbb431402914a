//! Generated gRPC types and service stubs, compiled from
//! `proto/drand.proto` by `tonic-build` at build time.

tonic::include_proto!("drand");
