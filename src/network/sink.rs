use std::sync::Arc;

use crate::network::Connection;
use crate::AppError;

/// The capability set the engine calls back into.
///
/// One implementation serves every connection of a listener, dialer or
/// combined endpoint. Callbacks run inline on whichever runtime worker
/// drove the completion, so implementations must not assume thread
/// affinity; anything slow belongs on a channel to a task of the
/// implementation's own.
pub trait ConnectionSink: Send + Sync + 'static {
    /// A new connection is live, whether accepted or dialed. Dropping the
    /// handle closes the connection, so implementations that want to keep
    /// it must store it.
    fn accepted(&self, connection: Arc<Connection>);

    /// One whole message. The bytes are borrowed for the duration of the
    /// call only.
    fn received(&self, connection: &Arc<Connection>, message: &[u8]);

    /// Terminal error on a connection; it is no longer usable and will
    /// deliver nothing further. Peer close arrives here as
    /// [`AppError::ConnectionClosed`].
    fn connection_error(&self, connection: &Arc<Connection>, error: AppError);

    /// An error not attributable to any connection, such as a bind or
    /// resolve failure. The listener keeps serving its other ports.
    fn error(&self, _error: AppError) {}

    /// An enqueued message finished its send.
    fn write_completed(&self, _connection: &Arc<Connection>) {}
}
