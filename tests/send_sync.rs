//! Send/Sync guarantees for shared types.

use femtobatch::{
    BatchWriterBuilder, Endpoint, FemtoBatchWriter, HttpTransmitter, Markers, ProcessShutdown,
    WriterConfig, WriterError, WriterSettings,
};
use rstest::rstest;
use static_assertions::assert_impl_all;

#[rstest]
fn configuration_is_send_sync() {
    assert_impl_all!(BatchWriterBuilder: Send, Sync, Clone);
    assert_impl_all!(WriterConfig: Send, Sync, Clone);
    assert_impl_all!(WriterSettings: Send, Sync);
    assert_impl_all!(Endpoint: Send, Sync);
    assert_impl_all!(Markers: Send, Sync);
}

#[rstest]
fn components_are_send_sync() {
    assert_impl_all!(FemtoBatchWriter: Send, Sync);
    assert_impl_all!(HttpTransmitter: Send, Sync);
    assert_impl_all!(ProcessShutdown: Send, Sync);
    assert_impl_all!(WriterError: Send, Sync, std::error::Error);
}
