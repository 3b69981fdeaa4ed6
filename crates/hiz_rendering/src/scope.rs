//! Error-scope capture for resource creation.

use hiz_core::{HizError, HizResult};

/// Runs `create` inside out-of-memory and validation error scopes.
///
/// wgpu reports creation failures asynchronously through the device error
/// handler; the scopes turn them into `ResourceAllocation` for the caller.
pub(crate) fn capture_allocation<T>(
    device: &wgpu::Device,
    resource: &'static str,
    create: impl FnOnce() -> T,
) -> HizResult<T> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());

    if let Some(error) = out_of_memory.or(validation) {
        tracing::error!(resource, %error, "GPU allocation failed");
        return Err(HizError::ResourceAllocation {
            resource,
            reason: error.to_string(),
        });
    }
    Ok(value)
}
