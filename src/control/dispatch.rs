use super::CameraControl;
use crate::error::ControlError;
use crate::params::ParamId;
use crate::sdk::ControlKind;

pub type IntHandler = fn(&mut CameraControl, i64) -> Result<(), ControlError>;
pub type FloatHandler = fn(&mut CameraControl, f64) -> Result<(), ControlError>;

/// Action run after a parameter has been stored.
#[derive(Clone, Copy)]
pub enum Handler {
    Int(IntHandler),
    Float(FloatHandler),
}

/// Parameters with side effects. Anything else is a plain store.
const HANDLERS: &[(ParamId, Handler)] = &[
    (ParamId::Acquire, Handler::Int(on_acquire)),
    (ParamId::ApplyFormat, Handler::Int(on_apply_format)),
    (ParamId::CameraFormat, Handler::Int(on_camera_format)),
    (ParamId::ImageMode, Handler::Int(on_image_mode)),
    (ParamId::Gamma, Handler::Int(on_gamma)),
    (ParamId::BacklightCompensation, Handler::Int(on_backlight_compensation)),
    (ParamId::Brightness, Handler::Int(on_brightness)),
    (ParamId::Contrast, Handler::Int(on_contrast)),
    (ParamId::PowerLine, Handler::Int(on_power_line)),
    (ParamId::Hue, Handler::Int(on_hue)),
    (ParamId::Saturation, Handler::Int(on_saturation)),
    (ParamId::Sharpness, Handler::Int(on_sharpness)),
    (ParamId::PanLeft, Handler::Int(on_pan_left)),
    (ParamId::PanRight, Handler::Int(on_pan_right)),
    (ParamId::TiltUp, Handler::Int(on_tilt_up)),
    (ParamId::TiltDown, Handler::Int(on_tilt_down)),
    (ParamId::ZoomIn, Handler::Int(on_zoom_in)),
    (ParamId::ZoomOut, Handler::Int(on_zoom_out)),
    (ParamId::Exposure, Handler::Float(on_exposure)),
    (ParamId::Gain, Handler::Float(on_gain)),
];

/// Parameters whose new value must not be seen by a running stream.
const STOP_BEFORE_STORE: &[ParamId] = &[
    ParamId::ImageFormat,
    ParamId::FrameRate,
    ParamId::ImageMode,
    ParamId::Exposure,
];

pub fn stops_acquisition(id: ParamId) -> bool {
    STOP_BEFORE_STORE.contains(&id)
}

pub fn lookup(id: ParamId) -> Option<Handler> {
    HANDLERS
        .iter()
        .find(|(param, _)| *param == id)
        .map(|(_, handler)| *handler)
}

fn on_acquire(control: &mut CameraControl, value: i64) -> Result<(), ControlError> {
    if value != 0 {
        control.start()
    } else {
        control.stop()
    }
}

fn on_apply_format(control: &mut CameraControl, value: i64) -> Result<(), ControlError> {
    if value != 0 {
        control.apply_selected_entry()
    } else {
        Ok(())
    }
}

fn on_camera_format(control: &mut CameraControl, value: i64) -> Result<(), ControlError> {
    control.select_catalog_entry(value)
}

fn on_image_mode(control: &mut CameraControl, value: i64) -> Result<(), ControlError> {
    control.change_image_mode(value)
}

fn on_gamma(control: &mut CameraControl, value: i64) -> Result<(), ControlError> {
    control.set_property(ControlKind::Gamma, value)
}

fn on_backlight_compensation(control: &mut CameraControl, value: i64) -> Result<(), ControlError> {
    control.set_property(ControlKind::BacklightCompensation, value)
}

fn on_brightness(control: &mut CameraControl, value: i64) -> Result<(), ControlError> {
    control.set_property(ControlKind::Brightness, value)
}

fn on_contrast(control: &mut CameraControl, value: i64) -> Result<(), ControlError> {
    control.set_property(ControlKind::Contrast, value)
}

fn on_power_line(control: &mut CameraControl, value: i64) -> Result<(), ControlError> {
    control.set_property(ControlKind::PowerLineFrequency, value)
}

fn on_hue(control: &mut CameraControl, value: i64) -> Result<(), ControlError> {
    control.set_property(ControlKind::Hue, value)
}

fn on_saturation(control: &mut CameraControl, value: i64) -> Result<(), ControlError> {
    control.set_property(ControlKind::Saturation, value)
}

fn on_sharpness(control: &mut CameraControl, value: i64) -> Result<(), ControlError> {
    control.set_property(ControlKind::Sharpness, value)
}

fn pan_tilt_button(
    control: &mut CameraControl,
    button: ParamId,
    value: i64,
    pan: i8,
    tilt: i8,
) -> Result<(), ControlError> {
    if value == 0 {
        return Ok(());
    }
    let result = control.pan_tilt(pan, tilt);
    control.with_params(|params| params.set_int(button, 0));
    result
}

fn on_pan_left(control: &mut CameraControl, value: i64) -> Result<(), ControlError> {
    pan_tilt_button(control, ParamId::PanLeft, value, -1, 0)
}

fn on_pan_right(control: &mut CameraControl, value: i64) -> Result<(), ControlError> {
    pan_tilt_button(control, ParamId::PanRight, value, 1, 0)
}

fn on_tilt_up(control: &mut CameraControl, value: i64) -> Result<(), ControlError> {
    pan_tilt_button(control, ParamId::TiltUp, value, 0, 1)
}

fn on_tilt_down(control: &mut CameraControl, value: i64) -> Result<(), ControlError> {
    pan_tilt_button(control, ParamId::TiltDown, value, 0, -1)
}

fn on_zoom_in(control: &mut CameraControl, value: i64) -> Result<(), ControlError> {
    if value == 0 {
        return Ok(());
    }
    let result = control.zoom(1);
    control.with_params(|params| params.set_int(ParamId::ZoomIn, 0));
    result
}

fn on_zoom_out(control: &mut CameraControl, value: i64) -> Result<(), ControlError> {
    if value == 0 {
        return Ok(());
    }
    let result = control.zoom(-1);
    control.with_params(|params| params.set_int(ParamId::ZoomOut, 0));
    result
}

fn on_exposure(control: &mut CameraControl, seconds: f64) -> Result<(), ControlError> {
    control.set_exposure(seconds)
}

fn on_gain(control: &mut CameraControl, gain: f64) -> Result<(), ControlError> {
    control.set_property(ControlKind::Gain, gain.round() as i64)
}
