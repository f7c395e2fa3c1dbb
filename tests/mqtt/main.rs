
mod reconnect;
mod session;
mod telemetry;
