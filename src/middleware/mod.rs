/*
 * Responsibility
 * - Public interface of the middleware layers
 * - app.rs applies `http` first and `cors` last (outermost)
 */
pub mod cors;
pub mod http;
