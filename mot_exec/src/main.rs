//! Main motion-control executable entry point.
//!
//! Runs the motion-control core against the simulated electronics driver:
//! initialises both wheels and the rover, then drives a demonstration
//! square, logging the pose estimate after every leg. On real hardware the
//! process wiring replaces the simulated pin factory with the memory-mapped
//! GPIO implementation and feeds the encoders from the live quadrature
//! stream instead.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::info;

// Internal
use mot_lib::elec_driver::{PinFactory, SimPinFactory};
use mot_lib::enc_driver::{self, Encoder};
use mot_lib::rover_ctrl::{self, meters, Orientation, RoverCtrl};
use mot_lib::wheel_ctrl::{self, WheelCtrl, WheelPins, WheelSide};
use util::logger::{logger_init, LevelFilter};
use util::session::Session;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// BCM pin assignments: (in_a, in_b, ena), encoder (a, b).
const LEFT_MOTOR_PINS: (u8, u8, u8) = (2, 3, 4);
const LEFT_ENCODER_PINS: (u8, u8) = (17, 27);
const RIGHT_MOTOR_PINS: (u8, u8, u8) = (5, 6, 13);
const RIGHT_ENCODER_PINS: (u8, u8) = (22, 23);

/// Side length of the demonstration square in metres.
const SQUARE_SIDE_M: f64 = 0.5;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    color_eyre::install()?;

    // Initialise session
    let session = Session::new("mot_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    info!("Diffbot Motion Control Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let enc_params: enc_driver::Params =
        util::params::load("enc_driver.toml").wrap_err("Could not load enc_driver params")?;
    let wheel_params: wheel_ctrl::Params =
        util::params::load("wheel_ctrl.toml").wrap_err("Could not load wheel_ctrl params")?;
    let rover_params: rover_ctrl::Params =
        util::params::load("rover_ctrl.toml").wrap_err("Could not load rover_ctrl params")?;

    info!("Parameters loaded");

    // ---- INITIALISE MODULES ----

    let mut factory = SimPinFactory::new();
    let simulated = factory.simulated();

    let left = WheelCtrl::new(
        WheelSide::Left,
        Encoder::new(
            0,
            LEFT_ENCODER_PINS.0,
            LEFT_ENCODER_PINS.1,
            simulated,
            enc_params.clone(),
        ),
        WheelPins {
            in_a: factory.digital_output(LEFT_MOTOR_PINS.0)?,
            in_b: factory.digital_output(LEFT_MOTOR_PINS.1)?,
            ena: factory.pwm_output(LEFT_MOTOR_PINS.2)?,
        },
        wheel_params.clone(),
    );

    let right = WheelCtrl::new(
        WheelSide::Right,
        Encoder::new(
            1,
            RIGHT_ENCODER_PINS.0,
            RIGHT_ENCODER_PINS.1,
            simulated,
            enc_params,
        ),
        WheelPins {
            in_a: factory.digital_output(RIGHT_MOTOR_PINS.0)?,
            in_b: factory.digital_output(RIGHT_MOTOR_PINS.1)?,
            ena: factory.pwm_output(RIGHT_MOTOR_PINS.2)?,
        },
        wheel_params,
    );

    let rover = RoverCtrl::new(left, right, rover_params.clone());

    info!("Modules initialised, driving a {} m square\n", SQUARE_SIDE_M);

    // ---- DEMONSTRATION DRIVE ----

    let side_ticks = meters(SQUARE_SIDE_M, rover_params.ticks_per_mm()).round() as i64;

    for leg in 0..4 {
        rover.go(side_ticks, 60.0).await?;
        rover.turn_relative(Orientation::from_degrees(90.0)).await;

        info!(
            "Leg {}: position {} ticks, orientation {}",
            leg + 1,
            rover.position().get(),
            rover.orientation().get()
        );
    }

    let metric = rover.position().get().metric(rover_params.ticks_per_mm());
    info!(
        "Square complete at ({:.3} m, {:.3} m), heading {}",
        metric.x,
        metric.y,
        rover.orientation().get()
    );

    // ---- SHUTDOWN ----

    rover.shutdown().await;
    info!("Rover shut down");

    Ok(())
}
