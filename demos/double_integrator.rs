extern crate nalgebra as na;

use anyhow::{anyhow, Result};
use na::{dmatrix, dvector};
use pi_solver::{
    Controller, DesiredTrajectory, Dynamics, InputBounds, LinearSystem, PiSettings, PiSolver, QuadraticCost,
    RolloutSettings, SolveStatus, TimeTriggeredRollout,
};

// cargo run --example double_integrator --release

// MARK: - Constants
// 予測ホライゾン
const T: f64 = 1.0;
const DT: f64 = 0.02;

// サンプル数と温度
const K: usize = 500;
const GAMMA: f64 = 0.1;

// MPC の更新周期 (シミュレーションステップ数)
const MPC_EVERY: usize = 5;
const SIM_TIME: f64 = 5.0;

const TARGET: f64 = 1.0;
const LIMIT: (f64, f64) = (-5.0, 5.0);

// MARK: - Main
fn main() -> Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()?;

    let system = LinearSystem::double_integrator();
    let rollout = TimeTriggeredRollout::new(system.clone(), RolloutSettings { min_time_step: DT });
    let cost = QuadraticCost::new(
        dmatrix![10.0, 0.0; 0.0, 1.0],
        dmatrix![0.01],
        dmatrix![100.0, 0.0; 0.0, 10.0],
    );
    let settings = PiSettings {
        num_samples: K,
        gamma: GAMMA,
        rollout: RolloutSettings { min_time_step: DT },
        noise_covariance: dmatrix![40.0],
        input_bounds: Some(InputBounds::new(dvector![LIMIT.0], dvector![LIMIT.1])),
        ..Default::default()
    };
    let mut solver = PiSolver::new(rollout, cost, None, settings)?;
    solver.set_desired_trajectory(DesiredTrajectory::constant(dvector![TARGET, 0.0], dvector![0.0]));

    std::fs::create_dir_all("logs")?;
    let path = format!("logs/double-integrator-{}.csv", chrono::Local::now().format("%Y%m%d-%H%M%S"));
    let mut wtr = csv::Writer::from_path(&path)?;
    wtr.write_record(["t", "u", "p", "v", "status"])?;

    let mut x = dvector![0.0, 0.0];
    let mut t = 0.0;
    let mut step = 0;
    let mut status = solver.run(t, &x, t + T)?;
    while t < SIM_TIME {
        if step > 0 && step % MPC_EVERY == 0 {
            status = solver.run(t, &x, t + T)?;
            if let SolveStatus::KeptPrevious { degenerate_step } = status {
                log::warn!("t: {t:.2} degenerate at step {degenerate_step}, reusing previous solution");
            }
        }

        let mut controller = solver.controller().cloned().ok_or_else(|| anyhow!("no controller yet"))?;
        let u = controller.compute_input(t, &x)?;
        x += system.flow_map(t, &x, &u) * DT;

        wtr.write_record(&[
            t.to_string(),
            u[0].to_string(),
            x[0].to_string(),
            x[1].to_string(),
            format!("{status:?}"),
        ])?;

        println!("t: {:.2}, u: {:6.2}, x: [{:6.3}, {:6.3}]", t, u[0], x[0], x[1]);
        t += DT;
        step += 1;
    }
    wtr.flush()?;

    log::info!("log written to {path}");
    Ok(())
}
