//! Built-in phase executors.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use url::Url;
use volimport_shared::errors::{ImportError, ImportResult};

use super::context::ImportContext;
use super::phase::ProcessingPhase;
use crate::image::{ImageOperations, path_url};
use crate::provider::DataProvider;
use crate::quantity::Quantity;
use crate::util::clean_all;

const DATA_FILE_MODE: u32 = 0o660;

fn image_url<P: DataProvider>(provider: &P) -> ImportResult<Url> {
    provider
        .url()
        .cloned()
        .ok_or_else(|| ImportError::Provider("data source did not report an image location".into()))
}

pub(super) fn info<P: DataProvider>(ctx: &mut ImportContext<P>) -> ImportResult<ProcessingPhase> {
    ctx.provider
        .info()
        .map_err(|e| e.in_phase("unable to obtain information about data source"))
}

pub(super) fn transfer_scratch<P: DataProvider>(
    ctx: &mut ImportContext<P>,
) -> ImportResult<ProcessingPhase> {
    match ctx.provider.transfer(&ctx.scratch_dir, ctx.preallocation) {
        Err(ImportError::InvalidPath(reason)) => {
            tracing::warn!(
                scratch_dir = %ctx.scratch_dir.display(),
                reason = %reason,
                "Scratch space unusable"
            );
            Err(ImportError::RequiresScratchSpace)
        }
        result => result.map_err(|e| e.in_phase("unable to transfer source data to scratch space")),
    }
}

pub(super) fn transfer_data_dir<P: DataProvider>(
    ctx: &mut ImportContext<P>,
) -> ImportResult<ProcessingPhase> {
    ctx.provider
        .transfer(&ctx.data_dir, ctx.preallocation)
        .map_err(|e| e.in_phase("unable to transfer source data to target directory"))
}

pub(super) fn transfer_data_file<P: DataProvider>(
    ctx: &mut ImportContext<P>,
) -> ImportResult<ProcessingPhase> {
    ctx.provider
        .transfer_file(&ctx.data_file, ctx.preallocation)
        .map_err(|e| e.in_phase("unable to transfer source data to target file"))
}

pub(super) fn validate_pause<P: DataProvider>(
    ctx: &mut ImportContext<P>,
) -> ImportResult<ProcessingPhase> {
    image_url(&ctx.provider)
        .and_then(|url| ctx.validate(&url))
        .map_err(|e| e.in_phase("unable to validate transferred image"))?;
    Ok(ProcessingPhase::PAUSE)
}

pub(super) fn convert<P: DataProvider>(ctx: &mut ImportContext<P>) -> ImportResult<ProcessingPhase> {
    convert_to_raw(ctx).map_err(|e| e.in_phase("unable to convert source data to target format"))
}

fn convert_to_raw<P: DataProvider>(ctx: &mut ImportContext<P>) -> ImportResult<ProcessingPhase> {
    let url = image_url(&ctx.provider)?;
    ctx.validate(&url)?;
    clean_all(&ctx.data_file)?;

    tracing::info!(
        source = %url,
        dest = %ctx.data_file.display(),
        preallocate = ctx.preallocation,
        "Converting image to raw"
    );
    ctx.ops.convert_to_raw_stream(
        &url,
        &ctx.data_file,
        ctx.preallocation,
        ctx.source_format.as_deref(),
    )?;
    ctx.preallocation_applied = ctx.preallocation;
    Ok(ProcessingPhase::RESIZE)
}

pub(super) fn resize<P: DataProvider>(ctx: &mut ImportContext<P>) -> ImportResult<ProcessingPhase> {
    resize_to_requested(ctx).map_err(|e| e.in_phase("unable to resize disk image to requested size"))
}

fn resize_to_requested<P: DataProvider>(ctx: &mut ImportContext<P>) -> ImportResult<ProcessingPhase> {
    let Some(requested) = Quantity::parse_optional(&ctx.requested_size)? else {
        tracing::debug!("No size requested, keeping image size");
        return Ok(ProcessingPhase::COMPLETE);
    };

    if ctx.is_block_device() {
        tracing::info!(
            dest = %ctx.data_file.display(),
            "Destination is a block device, nothing to resize"
        );
        ctx.preallocation_applied = ctx.preallocation;
        return Ok(ProcessingPhase::COMPLETE);
    }

    // Free space may have changed since construction; keep the old figure
    // if measuring fails now.
    if let Some(available) = ctx.calculate_target_size() {
        ctx.available_space = Some(available);
    }
    resize_image(
        ctx.ops.as_ref(),
        &ctx.data_file,
        requested,
        ctx.usable_space(),
        ctx.preallocation,
    )?;

    // A sparse image must still fit once it fills up.
    let url = path_url(&ctx.data_file)?;
    ctx.validate(&url)?;
    ctx.preallocation_applied = ctx.preallocation;

    std::fs::set_permissions(&ctx.data_file, std::fs::Permissions::from_mode(DATA_FILE_MODE))?;
    Ok(ProcessingPhase::COMPLETE)
}

pub(super) fn merge_delta<P: DataProvider>(
    ctx: &mut ImportContext<P>,
) -> ImportResult<ProcessingPhase> {
    merge(ctx).map_err(|e| e.in_phase("unable to apply delta to base image"))
}

fn merge<P: DataProvider>(ctx: &mut ImportContext<P>) -> ImportResult<ProcessingPhase> {
    let delta = image_url(&ctx.provider)?;
    tracing::info!(
        delta = %delta,
        base = %ctx.data_file.display(),
        "Merging delta into base image"
    );
    ctx.ops.rebase(&ctx.data_file, &delta)?;
    ctx.ops.commit(&delta)?;
    Ok(ProcessingPhase::COMPLETE)
}

/// Grow the raw image at `dest` to `requested`, capped at `budget`.
///
/// When the budget is smaller than the request the image is grown to the
/// budget with a warning. Nothing happens when the image already has the
/// target virtual size.
pub fn resize_image(
    ops: &dyn ImageOperations,
    dest: &Path,
    requested: Quantity,
    budget: Option<u64>,
    preallocate: bool,
) -> ImportResult<()> {
    let url = path_url(dest)?;
    let info = ops.info(&url)?;

    let target = match budget {
        Some(budget) if budget < requested.bytes() => {
            tracing::warn!(
                requested = requested.bytes(),
                available = budget,
                "Available space less than requested size, resizing image to available space"
            );
            budget
        }
        Some(_) => requested.bytes(),
        None => {
            tracing::warn!(
                requested = requested.bytes(),
                "Available space unknown, resizing image to requested size"
            );
            requested.bytes()
        }
    };

    if info.virtual_size == target {
        tracing::info!(size = target, "Image already has the target size, skipping resize");
        return Ok(());
    }

    tracing::info!(
        dest = %dest.display(),
        from = info.virtual_size,
        to = target,
        "Resizing image"
    );
    ops.resize(dest, Quantity::from_bytes(target), preallocate)
}
