//! Model persistence.
//!
//! Burn records are written and read with [`NamedMpkFileRecorder`] at full
//! precision. With the `pretrained` feature, state dicts saved from the PyTorch
//! `U_Net` / `ResAttU_Net` classes can be loaded directly; their keys are
//! remapped onto the Burn module tree by [`pytorch_key_remaps`].

use std::path::Path;

use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
};

use crate::{
    config::ModelKind,
    error::{UNetError, UNetResult},
};

/// Saves `model` to `path` (the `.mpk` extension is added by the recorder).
///
/// # Errors
///
/// Returns `Err(UNetError::WeightSavingFailed)` if the record cannot be written.
pub fn save_model<B: Backend, M: Module<B>>(model: M, path: &Path) -> UNetResult<()> {
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    model
        .save_file(path.to_path_buf(), &recorder)
        .map_err(|e| UNetError::WeightSavingFailed {
            reason: format!("{}: {e}", path.display()),
        })?;

    tracing::debug!(path = %path.display(), "saved model record");
    Ok(())
}

/// Loads a record written by [`save_model`] into `model`.
///
/// `model` must have been built with the same configuration as the saved one.
///
/// # Errors
///
/// Returns `Err(UNetError::WeightLoadingFailed)` if the file cannot be read or
/// does not match the module structure.
pub fn load_model<B: Backend, M: Module<B>>(
    model: M,
    path: &Path,
    device: &Device<B>,
) -> UNetResult<M> {
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let model = model
        .load_file(path.to_path_buf(), &recorder, device)
        .map_err(|e| UNetError::WeightLoadingFailed {
            reason: format!("{}: {e}", path.display()),
        })?;

    tracing::debug!(path = %path.display(), "loaded model record");
    Ok(model)
}

/// Regex key remaps from a PyTorch state dict to the Burn module tree.
///
/// PyTorch stage `n` (1-based, `Conv{n}`) is encoder index `n - 1`, and the
/// decoder stage `Up{n}` / `Att{n}` / `Up_conv{n}` is decoder index `n - 2`.
/// Remaps are only produced for stages that exist at `depth`, so keys of
/// deeper stages keep their PyTorch names and are ignored on load.
#[must_use]
pub fn pytorch_key_remaps(kind: &ModelKind, depth: usize) -> Vec<(String, String)> {
    // Sequential indices of conv_block: 0 conv, 1 bn, 2 relu, 3 conv, 4 bn, 5 relu.
    const CONV_BLOCK: [(usize, &str); 4] = [(0, "conv1"), (1, "bn1"), (3, "conv2"), (4, "bn2")];

    let encoder_block = match kind {
        ModelKind::UNet => "",
        ModelKind::ResAttUNet => "conv.",
    };

    let mut remaps = Vec::new();
    for n in 1..=depth {
        let i = n - 1;
        for (seq, field) in CONV_BLOCK {
            remaps.push((
                format!(r"^Conv{n}\.conv\.{seq}\.(.+)$"),
                format!("encoder.{i}.{encoder_block}{field}.$1"),
            ));
        }
        if *kind == ModelKind::ResAttUNet {
            remaps.push((
                format!(r"^Conv{n}\.Conv_1x1\.(.+)$"),
                format!("encoder.{i}.conv_1x1.$1"),
            ));
        }
    }

    for n in 2..=depth {
        let i = n - 2;
        // up_conv: 0 upsample, 1 conv, 2 bn, 3 relu.
        remaps.push((
            format!(r"^Up{n}\.up\.1\.(.+)$"),
            format!("decoder.{i}.up.conv.$1"),
        ));
        remaps.push((
            format!(r"^Up{n}\.up\.2\.(.+)$"),
            format!("decoder.{i}.up.bn.$1"),
        ));
        for (seq, field) in CONV_BLOCK {
            remaps.push((
                format!(r"^Up_conv{n}\.conv\.{seq}\.(.+)$"),
                format!("decoder.{i}.up_conv.{field}.$1"),
            ));
        }
        if *kind == ModelKind::ResAttUNet {
            for (branch, field) in [("W_g", "w_g"), ("W_x", "w_x"), ("psi", "psi")] {
                remaps.push((
                    format!(r"^Att{n}\.{branch}\.0\.(.+)$"),
                    format!("decoder.{i}.att.{field}_conv.$1"),
                ));
                remaps.push((
                    format!(r"^Att{n}\.{branch}\.1\.(.+)$"),
                    format!("decoder.{i}.att.{field}_bn.$1"),
                ));
            }
        }
    }

    remaps.push((r"^Conv_1x1\.(.+)$".to_string(), "conv_1x1.$1".to_string()));
    remaps
}

#[cfg(feature = "pretrained")]
mod pytorch {
    use std::path::Path;

    use burn::{
        prelude::*,
        record::{FullPrecisionSettings, Recorder},
    };
    use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};

    use super::pytorch_key_remaps;
    use crate::{
        config::ModelKind,
        error::{UNetError, UNetResult},
        models::{ResAttUNet, ResAttUNetRecord, SegmentationModel, UNet, UNetRecord},
    };

    fn load_args(path: &Path, kind: &ModelKind, depth: usize) -> LoadArgs {
        pytorch_key_remaps(kind, depth).into_iter().fold(
            LoadArgs::new(path.to_path_buf()),
            |args, (pattern, replacement)| args.with_key_remap(&pattern, &replacement),
        )
    }

    fn load_failed(path: &Path, e: impl std::fmt::Display) -> UNetError {
        UNetError::WeightLoadingFailed {
            reason: format!("PyTorch model loading failed for {}: {e}", path.display()),
        }
    }

    /// Loads a PyTorch `U_Net` state dict into `model`.
    ///
    /// # Errors
    ///
    /// Returns `Err(UNetError::WeightLoadingFailed)` if the file cannot be read
    /// or its tensors do not fit the model.
    pub fn load_pytorch_unet<B: Backend>(
        model: UNet<B>,
        path: &Path,
        device: &Device<B>,
    ) -> UNetResult<UNet<B>> {
        let depth = model.network().depth;
        tracing::debug!(path = %path.display(), depth, "loading PyTorch U_Net weights");

        let record: UNetRecord<B> = PyTorchFileRecorder::<FullPrecisionSettings>::default()
            .load(load_args(path, &ModelKind::UNet, depth), device)
            .map_err(|e| load_failed(path, e))?;

        Ok(model.load_record(record))
    }

    /// Loads a PyTorch `ResAttU_Net` state dict into `model`.
    ///
    /// # Errors
    ///
    /// Returns `Err(UNetError::WeightLoadingFailed)` if the file cannot be read
    /// or its tensors do not fit the model.
    pub fn load_pytorch_res_att_unet<B: Backend>(
        model: ResAttUNet<B>,
        path: &Path,
        device: &Device<B>,
    ) -> UNetResult<ResAttUNet<B>> {
        let depth = model.network().depth;
        tracing::debug!(path = %path.display(), depth, "loading PyTorch ResAttU_Net weights");

        let record: ResAttUNetRecord<B> = PyTorchFileRecorder::<FullPrecisionSettings>::default()
            .load(load_args(path, &ModelKind::ResAttUNet, depth), device)
            .map_err(|e| load_failed(path, e))?;

        Ok(model.load_record(record))
    }

    /// Loads a PyTorch state dict matching the variant of `model`.
    ///
    /// # Errors
    ///
    /// See [`load_pytorch_unet`] and [`load_pytorch_res_att_unet`].
    pub fn load_pytorch_weights<B: Backend>(
        model: SegmentationModel<B>,
        path: &Path,
        device: &Device<B>,
    ) -> UNetResult<SegmentationModel<B>> {
        match model {
            SegmentationModel::UNet(model) => {
                load_pytorch_unet(model, path, device).map(SegmentationModel::UNet)
            }
            SegmentationModel::ResAttUNet(model) => {
                load_pytorch_res_att_unet(model, path, device).map(SegmentationModel::ResAttUNet)
            }
        }
    }
}

#[cfg(feature = "pretrained")]
pub use pytorch::{load_pytorch_res_att_unet, load_pytorch_unet, load_pytorch_weights};
