use crate::perception::types::PerceptionMode;

/// One action the model may call, as described in the prompt.
#[derive(Debug, Clone, Copy)]
pub struct ActionSignature {
    pub name: &'static str,
    pub arguments: &'static [&'static str],
    pub description: &'static str,
}

const SWIPE: ActionSignature = ActionSignature {
    name: "Swipe",
    arguments: &["direction", "dist"],
    description: "Swipe the screen, e.g. to scroll a list or move a slider. direction is one of 'up', 'down', 'left', 'right'; dist is 'short', 'medium' or 'long'. Example: {\"name\":\"Swipe\", \"arguments\":{\"direction\":\"up\", \"dist\":\"short\"}}",
};
const TYPE: ActionSignature = ActionSignature {
    name: "Type",
    arguments: &["text"],
    description: "Type text into the focused input box; use it when the keyboard is visible. Example: {\"name\":\"Type\", \"arguments\":{\"text\":\"coffee\"}}",
};
const ENTER: ActionSignature = ActionSignature {
    name: "Enter",
    arguments: &[],
    description: "Press Enter to submit input, e.g. right after typing a search. Example: {\"name\":\"Enter\", \"arguments\":{}}",
};
const BACK: ActionSignature = ActionSignature {
    name: "Back",
    arguments: &[],
    description: "Return to the previous screen. Example: {\"name\":\"Back\", \"arguments\":{}}",
};
const HOME: ActionSignature = ActionSignature {
    name: "Home",
    arguments: &[],
    description: "Go to the home screen. Example: {\"name\":\"Home\", \"arguments\":{}}",
};
const CLEAR: ActionSignature = ActionSignature {
    name: "Clear",
    arguments: &[],
    description: "Clear the text in the focused input box when it is wrong. Example: {\"name\":\"Clear\", \"arguments\":{}}",
};
const DONE: ActionSignature = ActionSignature {
    name: "Done",
    arguments: &[],
    description: "Signal that the task is complete. Use it only when the goal is visibly achieved. Example: {\"name\":\"Done\", \"arguments\":{}}",
};

const COORDINATE: &[ActionSignature] = &[
    ActionSignature {
        name: "Tap",
        arguments: &["x", "y"],
        description: "Tap the position (x, y) on the current screen. The origin [0,0] is the top-left corner; x is horizontal, y is vertical. Example: {\"name\":\"Tap\", \"arguments\":{\"x\":100, \"y\":200}}",
    },
    SWIPE,
    TYPE,
    ENTER,
    BACK,
    HOME,
    CLEAR,
    DONE,
];

const GRID: &[ActionSignature] = &[
    ActionSignature {
        name: "Tap",
        arguments: &["area", "subarea"],
        description: "Tap a grid cell. 'area' is the integer label of the cell; 'subarea' is one of center, top-left, top, top-right, left, right, bottom-left, bottom, bottom-right. Example: {\"name\":\"Tap\", \"arguments\":{\"area\":5, \"subarea\":\"center\"}}",
    },
    SWIPE,
    TYPE,
    ENTER,
    BACK,
    HOME,
    CLEAR,
    DONE,
];

const SET_OF_MARKS: &[ActionSignature] = &[
    ActionSignature {
        name: "Tap",
        arguments: &["element_id"],
        description: "Tap the element with the given numeric tag (drawn in its box). Do NOT compute coordinates. Example: {\"name\":\"Tap\", \"arguments\":{\"element_id\":5}}",
    },
    SWIPE,
    TYPE,
    ENTER,
    BACK,
    HOME,
    CLEAR,
    DONE,
];

const COMPOSITE: &[ActionSignature] = &[
    ActionSignature {
        name: "Tap",
        arguments: &["element_id", "x", "y"],
        description: "Tap an element by its prefixed ID (e.g. \"som:3\") or, when no element fits, by pixel position. Example: {\"name\":\"Tap\", \"arguments\":{\"element_id\":\"som:3\"}} or {\"name\":\"Tap\", \"arguments\":{\"x\":100, \"y\":200}}",
    },
    SWIPE,
    TYPE,
    ENTER,
    BACK,
    HOME,
    CLEAR,
    DONE,
];

pub fn signatures_for(mode: PerceptionMode) -> &'static [ActionSignature] {
    match mode {
        PerceptionMode::Coordinate => COORDINATE,
        PerceptionMode::Grid => GRID,
        PerceptionMode::SetOfMarks => SET_OF_MARKS,
        PerceptionMode::Composite => COMPOSITE,
    }
}

/// `- Name(arg, arg): description` per line.
pub fn render_actions(mode: PerceptionMode) -> String {
    signatures_for(mode)
        .iter()
        .map(|s| format!("- {}({}): {}\n", s.name, s.arguments.join(", "), s.description))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tap_arguments_follow_mode() {
        assert!(render_actions(PerceptionMode::Grid).contains("- Tap(area, subarea):"));
        assert!(render_actions(PerceptionMode::SetOfMarks).contains("- Tap(element_id):"));
        assert!(render_actions(PerceptionMode::Coordinate).contains("- Tap(x, y):"));
    }

    #[test]
    fn every_mode_can_finish() {
        for mode in [
            PerceptionMode::Coordinate,
            PerceptionMode::Grid,
            PerceptionMode::SetOfMarks,
            PerceptionMode::Composite,
        ] {
            assert!(signatures_for(mode).iter().any(|s| s.name == "Done"));
        }
    }
}
