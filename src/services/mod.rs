pub mod cors_policy;
