/// Acciones que se pueden disparar reaccionando al mensaje del reproductor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    TogglePlayPause,
    ToggleLoop,
    VolumeUp,
    VolumeDown,
    Skip,
}

/// Paso de volumen de las reacciones ⬆/⬇
pub const VOLUME_STEP: i32 = 10;

/// Tabla fija glifo → acción, en el orden en que se agregan las reacciones
const CONTROL_GLYPHS: [(&str, ControlAction); 5] = [
    ("⏯", ControlAction::TogglePlayPause),
    ("🔁", ControlAction::ToggleLoop),
    ("⬆", ControlAction::VolumeUp),
    ("⬇", ControlAction::VolumeDown),
    ("⏭", ControlAction::Skip),
];

impl ControlAction {
    /// Reconoce un glifo, con o sin el selector de variación U+FE0F que
    /// Discord agrega a algunos emojis
    pub fn from_glyph(glyph: &str) -> Option<Self> {
        let glyph = glyph.trim_end_matches('\u{fe0f}');
        CONTROL_GLYPHS
            .iter()
            .find(|(g, _)| *g == glyph)
            .map(|(_, action)| *action)
    }

    pub fn glyph(self) -> &'static str {
        CONTROL_GLYPHS
            .iter()
            .find(|(_, action)| *action == self)
            .map(|(g, _)| *g)
            .unwrap_or_default()
    }

    /// La repetición no aplica a radios
    pub fn applies_to(self, is_radio: bool) -> bool {
        !(is_radio && self == ControlAction::ToggleLoop)
    }

    /// Acciones disponibles para el item actual, en orden de la tabla
    pub fn available(is_radio: bool) -> impl Iterator<Item = ControlAction> {
        CONTROL_GLYPHS
            .into_iter()
            .map(|(_, action)| action)
            .filter(move |action| action.applies_to(is_radio))
    }
}
