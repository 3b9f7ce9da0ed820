use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use medlyn_g1::physics::conductance::Drivers;
use medlyn_g1::physics::{estimate_pressure, Forcing, MedlynModel, PenmanMonteith};

// Noise-free daylight observations generated from a known g1
fn create_fit_data(n: usize, g1: f64) -> (Vec<Drivers>, Vec<f64>) {
    let drivers: Vec<Drivers> = (0..n)
        .map(|i| Drivers {
            vpd: 0.3 + (i % 40) as f64 * 0.07,
            gpp: 4.0 + (i % 17) as f64 * 1.1,
            co2: 370.0 + (i % 5) as f64,
        })
        .collect();
    let gs = drivers
        .iter()
        .map(|d| MedlynModel::conductance(d.vpd, d.gpp, d.co2, 0.0, g1))
        .collect();
    (drivers, gs)
}

fn benchmark_medlyn_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("medlyn_fit");
    let model = MedlynModel::new();

    for n in [50, 500, 5000] {
        let (drivers, gs) = create_fit_data(n, 3.2);
        group.bench_with_input(BenchmarkId::new("samples", n), &n, |b, _| {
            b.iter(|| model.fit(black_box(&drivers), black_box(&gs)))
        });
    }

    group.finish();
}

fn benchmark_penman_monteith(c: &mut Criterion) {
    let model = PenmanMonteith::with_friction_velocity();
    let forcing = Forcing {
        vpd: 1500.0,
        wind: 3.0,
        rnet: 450.0,
        tair: 24.0,
        pressure: estimate_pressure(24.0, 350.0),
        ustar: Some(0.45),
        ground_heat_flux: Some(25.0),
    };
    let transpiration = model.forward(&forcing, 0.25).unwrap_or(0.005);

    c.bench_function("pm_invert", |b| {
        b.iter(|| model.invert(black_box(&forcing), black_box(transpiration)))
    });

    c.bench_function("estimate_pressure", |b| {
        b.iter(|| estimate_pressure(black_box(18.0), black_box(1200.0)))
    });
}

criterion_group!(benches, benchmark_medlyn_fit, benchmark_penman_monteith);
criterion_main!(benches);
