use crate::foundation::error::{ComposeError, ComposeResult};

/// Options for an [`Image`](crate::Image).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageOpts {
    /// Composite the floating-selection overlay in linear light.
    pub linear: bool,
    /// Name of the stage that hosts a floating selection.
    pub floating_stage_name: String,
    /// Record node invalidations for
    /// [`Image::take_invalidations`](crate::Image::take_invalidations).
    pub record_damage: bool,
    /// Queue property-change events until [`Image::dispatch_events`](crate::Image::dispatch_events)
    /// instead of handling them when the triggering setter returns.
    pub deferred_dispatch: bool,
}

impl Default for ImageOpts {
    fn default() -> Self {
        Self {
            linear: false,
            floating_stage_name: "Floating Selection".to_owned(),
            record_damage: true,
            deferred_dispatch: false,
        }
    }
}

impl ImageOpts {
    /// Parse options from JSON; missing fields take their defaults.
    pub fn from_json_str(s: &str) -> ComposeResult<Self> {
        let opts: Self =
            serde_json::from_str(s).map_err(|e| ComposeError::serde(e.to_string()))?;
        if opts.floating_stage_name.is_empty() {
            return Err(ComposeError::invalid_argument(
                "floating_stage_name must not be empty",
            ));
        }
        Ok(opts)
    }
}

/// Property change that requires the floating-selection overlay to be re-derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageEvent {
    /// The floating layer moved.
    FloatingOffset,
    /// The floating layer was shown or hidden.
    FloatingVisible,
    /// The floating layer's blend mode changed.
    FloatingMode,
    /// The floating layer's opacity changed.
    FloatingOpacity,
    /// The image's active channels changed.
    ActiveChannels,
    /// The selection mask changed.
    SelectionMask,
}

impl ImageEvent {
    /// Whether handling the event also damages the whole floating layer.
    pub(crate) fn damages_floating_layer(self) -> bool {
        matches!(self, Self::ActiveChannels | Self::SelectionMask)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/document/opts.rs"]
mod tests;
