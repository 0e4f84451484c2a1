use winit::event::{ElementState, MouseButton as WinitMouseButton, WindowEvent};
use winit::keyboard::{KeyCode, ModifiersState, PhysicalKey};

use crate::input::{InputEvent, InputState, Key, KeyState, Modifiers, MouseButton, MouseButtonState, PointerButtonEvent};

/// Translates a winit `WindowEvent` into an engine `InputEvent`.
///
/// Returns `None` for events the input subsystem does not represent.
/// Pointer positions stay in physical pixels.
pub(crate) fn translate_window_event(state: &InputState, event: &WindowEvent) -> Option<InputEvent> {
    match event {
        WindowEvent::ModifiersChanged(m) => Some(InputEvent::ModifiersChanged(map_modifiers(m.state()))),

        WindowEvent::Focused(f) => Some(InputEvent::Focused(*f)),

        WindowEvent::CursorLeft { .. } => Some(InputEvent::PointerLeft),

        WindowEvent::CursorMoved { position, .. } => Some(InputEvent::PointerMoved {
            x: position.x as f32,
            y: position.y as f32,
        }),

        WindowEvent::MouseInput { state: st, button, .. } => {
            let (x, y) = state.pointer_or_origin();
            Some(InputEvent::PointerButton(PointerButtonEvent {
                button: map_mouse_button(*button),
                state: match st {
                    ElementState::Pressed => MouseButtonState::Pressed,
                    ElementState::Released => MouseButtonState::Released,
                },
                x,
                y,
            }))
        }

        WindowEvent::KeyboardInput { event, .. } => Some(InputEvent::Key {
            key: map_key(event.physical_key),
            state: match event.state {
                ElementState::Pressed => KeyState::Pressed,
                ElementState::Released => KeyState::Released,
            },
            repeat: event.repeat,
        }),

        _ => None,
    }
}

fn map_modifiers(m: ModifiersState) -> Modifiers {
    Modifiers {
        shift: m.shift_key(),
        ctrl: m.control_key(),
        alt: m.alt_key(),
        meta: m.super_key(),
    }
}

fn map_mouse_button(b: WinitMouseButton) -> MouseButton {
    match b {
        WinitMouseButton::Left => MouseButton::Left,
        WinitMouseButton::Right => MouseButton::Right,
        WinitMouseButton::Middle => MouseButton::Middle,
        WinitMouseButton::Back => MouseButton::Other(3),
        WinitMouseButton::Forward => MouseButton::Other(4),
        WinitMouseButton::Other(v) => MouseButton::Other(v),
    }
}

fn map_key(pk: PhysicalKey) -> Key {
    let PhysicalKey::Code(code) = pk else {
        return Key::Unknown(0);
    };

    const LETTERS: [(KeyCode, Key); 26] = [
        (KeyCode::KeyA, Key::A), (KeyCode::KeyB, Key::B), (KeyCode::KeyC, Key::C),
        (KeyCode::KeyD, Key::D), (KeyCode::KeyE, Key::E), (KeyCode::KeyF, Key::F),
        (KeyCode::KeyG, Key::G), (KeyCode::KeyH, Key::H), (KeyCode::KeyI, Key::I),
        (KeyCode::KeyJ, Key::J), (KeyCode::KeyK, Key::K), (KeyCode::KeyL, Key::L),
        (KeyCode::KeyM, Key::M), (KeyCode::KeyN, Key::N), (KeyCode::KeyO, Key::O),
        (KeyCode::KeyP, Key::P), (KeyCode::KeyQ, Key::Q), (KeyCode::KeyR, Key::R),
        (KeyCode::KeyS, Key::S), (KeyCode::KeyT, Key::T), (KeyCode::KeyU, Key::U),
        (KeyCode::KeyV, Key::V), (KeyCode::KeyW, Key::W), (KeyCode::KeyX, Key::X),
        (KeyCode::KeyY, Key::Y), (KeyCode::KeyZ, Key::Z),
    ];
    const DIGITS: [(KeyCode, Key); 10] = [
        (KeyCode::Digit0, Key::Digit0), (KeyCode::Digit1, Key::Digit1),
        (KeyCode::Digit2, Key::Digit2), (KeyCode::Digit3, Key::Digit3),
        (KeyCode::Digit4, Key::Digit4), (KeyCode::Digit5, Key::Digit5),
        (KeyCode::Digit6, Key::Digit6), (KeyCode::Digit7, Key::Digit7),
        (KeyCode::Digit8, Key::Digit8), (KeyCode::Digit9, Key::Digit9),
    ];

    match code {
        KeyCode::Escape => Key::Escape,
        KeyCode::Enter => Key::Enter,
        KeyCode::Space => Key::Space,
        KeyCode::Tab => Key::Tab,

        KeyCode::ArrowUp => Key::ArrowUp,
        KeyCode::ArrowDown => Key::ArrowDown,
        KeyCode::ArrowLeft => Key::ArrowLeft,
        KeyCode::ArrowRight => Key::ArrowRight,

        KeyCode::ShiftLeft | KeyCode::ShiftRight => Key::Shift,
        KeyCode::ControlLeft | KeyCode::ControlRight => Key::Control,
        KeyCode::AltLeft | KeyCode::AltRight => Key::Alt,

        KeyCode::F5 => Key::F5,
        KeyCode::F12 => Key::F12,

        other => LETTERS
            .iter()
            .chain(&DIGITS)
            .find(|(c, _)| *c == other)
            .map(|&(_, key)| key)
            .unwrap_or(Key::Unknown(other as u32)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_engine_keys() {
        assert_eq!(map_key(PhysicalKey::Code(KeyCode::KeyS)), Key::S);
        assert_eq!(map_key(PhysicalKey::Code(KeyCode::Digit7)), Key::Digit7);
        assert_eq!(map_key(PhysicalKey::Code(KeyCode::Escape)), Key::Escape);
        assert_eq!(map_key(PhysicalKey::Code(KeyCode::ShiftRight)), Key::Shift);
        assert!(matches!(map_key(PhysicalKey::Code(KeyCode::F9)), Key::Unknown(_)));
    }

    #[test]
    fn modifiers_and_buttons_map() {
        let m = map_modifiers(ModifiersState::SHIFT | ModifiersState::CONTROL);
        assert!(m.shift && m.ctrl && !m.alt && !m.meta);
        assert_eq!(map_mouse_button(WinitMouseButton::Back), MouseButton::Other(3));
    }

    #[test]
    fn focus_and_cursor_events_translate() {
        let state = InputState::default();
        assert_eq!(translate_window_event(&state, &WindowEvent::Focused(true)), Some(InputEvent::Focused(true)));
        assert_eq!(translate_window_event(&state, &WindowEvent::RedrawRequested), None);
    }
}
