use medlyn_g1::config::{PipelineConfig, ScreeningConfig};
use medlyn_g1::physics::{estimate_pressure, MedlynModel};
use medlyn_g1::processors::{
    EstimationMethod, ParallelDispatcher, ResultScreener, SiteYearProcessor,
};
use medlyn_g1::readers::{FluxReader, GlobalCo2Table, SiteCatalog};
use medlyn_g1::utils::constants::{BAD_VALUE, WM2_TO_MOL_H2O_M2_S};
use medlyn_g1::utils::ProgressReporter;
use medlyn_g1::writers::CsvWriter;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::TempDir;

const G1_TRUE: f64 = 3.2;
const STANDARD_PRESSURE_KPA: f64 = 101.135;

/// A full half-hourly year whose bulk-transfer conductance follows the
/// Medlyn relation exactly. June to August carry the highest GPP.
fn write_site_year(path: &Path, pressure_kpa: impl Fn(f64) -> f64) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(
        out,
        "Year,DoY,Time,VPD_f,GPP_f,CO2,LE_f,Precip_f,Ta_f,LE_fqcOK,VPD_fqcOK,NEE_GPP_qcOK,Precip_fqcOK"
    )?;

    let days_before_june = 151;
    let days_before_september = 243;
    for i in 0..(365 * 48 + 1) {
        let day = i / 48;
        let time = (i % 48) as f64 * 0.5;
        let summer = (days_before_june..days_before_september).contains(&day);

        let vpd_kpa = 0.8 + 0.1 * (i % 17) as f64;
        let seasonal = if summer { 8.0 + (i % 11) as f64 } else { 2.0 };
        let diurnal = if (6.0..19.0).contains(&time) { 1.0 } else { 0.1 };
        let gpp = seasonal * diurnal;
        let tair = 20.0;
        let gs = MedlynModel::conductance(vpd_kpa, gpp, 380.0, 0.0, G1_TRUE);
        let le = gs * vpd_kpa / pressure_kpa(tair) / WM2_TO_MOL_H2O_M2_S;

        writeln!(
            out,
            "2003,{},{},{},{},380,{},0,{},1,1,1,1",
            day + 1,
            time,
            vpd_kpa * 10.0,
            gpp,
            le,
            tair
        )?;
    }
    out.flush()
}

fn write_inputs(dir: &Path) -> std::io::Result<()> {
    let mut sites = File::create(dir.join("sites.csv"))?;
    writeln!(
        sites,
        "Site_ID,Name,Country,Latitude,Longitude,Elevation,IGBP_class,Climate_class,Climate_group"
    )?;
    writeln!(sites, "XX-Syn,\"Synthetic, High\",Nowhere,45.0,10.0,500,ENF,Cfb,Temperate")?;
    writeln!(sites, "XX-Alt,Synthetic Low,Nowhere,46.0,11.0,TBD,GRA,Cfb,Temperate")?;

    let mut lai = File::create(dir.join("lai.csv"))?;
    writeln!(lai, "sitename,LAI,LAI_MIN,LAI_MAX")?;
    writeln!(lai, "XX-Syn,4.0,2.0,6.0")?;
    writeln!(lai, "XX-Alt,2.0,0.5,3.0")?;

    let mut co2 = File::create(dir.join("co2.csv"))?;
    writeln!(co2, "# annual global means")?;
    writeln!(co2, "year,mean,unc")?;
    writeln!(co2, "2003,375.0,0.1")?;

    let flux = dir.join("flux");
    std::fs::create_dir_all(&flux)?;
    write_site_year(&flux.join("XX-Syn.2003.synth.csv"), |tair| {
        estimate_pressure(tair, 500.0) / 1000.0
    })?;
    write_site_year(&flux.join("XX-Alt.2003.synth.csv"), |_| STANDARD_PRESSURE_KPA)?;
    // unknown site, and a year with no global CO2
    write_site_year(&flux.join("ZZ-Non.2003.synth.csv"), |_| STANDARD_PRESSURE_KPA)?;
    write_site_year(&flux.join("XX-Syn.2004.synth.csv"), |_| STANDARD_PRESSURE_KPA)?;
    Ok(())
}

fn processor(dir: &Path) -> SiteYearProcessor {
    let catalog = SiteCatalog::load(&dir.join("sites.csv"), &dir.join("lai.csv")).unwrap();
    let co2 = GlobalCo2Table::read(&dir.join("co2.csv")).unwrap();
    SiteYearProcessor::for_method(
        EstimationMethod::Simple,
        PipelineConfig::default().filter,
        catalog,
        co2,
    )
}

#[test]
fn test_fit_pipeline_end_to_end() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    write_inputs(temp_dir.path()).unwrap();

    let files = FluxReader::new()
        .discover(&temp_dir.path().join("flux"))
        .unwrap();
    assert_eq!(files.len(), 4);

    let outcome = ParallelDispatcher::new(3).run(
        &files,
        &processor(temp_dir.path()),
        &ProgressReporter::silent(),
    );

    assert!(outcome.summary.is_balanced());
    assert_eq!(outcome.summary.good, 2);
    assert_eq!(outcome.summary.bad, 2);

    let syn = outcome
        .rows
        .iter()
        .find(|r| r.site == "XX-Syn" && r.year == 2003)
        .unwrap();
    assert!(syn.is_good(), "{}", syn.failure_reason);
    assert!((syn.g1 - G1_TRUE).abs() / G1_TRUE < 0.01);
    assert!(syn.r2 > 0.99);
    assert_eq!(syn.name, "Synthetic High");
    assert_eq!(syn.gs_method, "bulk_hypsometric_pressure");
    assert_eq!(syn.lai_max, 6.0);

    let alt = outcome.rows.iter().find(|r| r.site == "XX-Alt").unwrap();
    assert!(alt.is_good(), "{}", alt.failure_reason);
    assert!((alt.g1 - G1_TRUE).abs() / G1_TRUE < 0.01);
    assert_eq!(alt.gs_method, "bulk_standard_pressure");

    let unknown = outcome.rows.iter().find(|r| r.site == "ZZ-Non").unwrap();
    assert!(!unknown.is_good());
    assert_eq!(unknown.g1, BAD_VALUE);

    let no_co2 = outcome
        .rows
        .iter()
        .find(|r| r.site == "XX-Syn" && r.year == 2004)
        .unwrap();
    assert!(!no_co2.is_good());
    // identity columns survive on bad rows
    assert_eq!(no_co2.latitude, 45.0);
}

#[test]
fn test_fit_table_screening_round_trip() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    write_inputs(temp_dir.path()).unwrap();

    let files = FluxReader::new()
        .discover(&temp_dir.path().join("flux"))
        .unwrap();
    let outcome = ParallelDispatcher::new(2).run(
        &files,
        &processor(temp_dir.path()),
        &ProgressReporter::silent(),
    );

    let fit_path = temp_dir.path().join("g1_fluxnet.csv");
    let writer = CsvWriter::new();
    writer.write_fits(&outcome.rows, &fit_path).unwrap();
    let fits = writer.read_fits(&fit_path).unwrap();
    assert_eq!(fits.len(), 4);

    let screened = ResultScreener::new(ScreeningConfig::default()).screen(fits);
    assert_eq!(screened.report.input_rows, 4);
    assert_eq!(screened.report.low_r2, 2);

    let rows: Vec<(&str, &str)> = screened
        .rows
        .iter()
        .map(|r| (r.site.as_str(), r.pft.as_str()))
        .collect();
    assert_eq!(rows, vec![("XX-Alt", "C3G"), ("XX-Syn", "ENF")]);
    assert!(screened
        .rows
        .iter()
        .all(|r| r.g1_anomaly_pct == BAD_VALUE && r.scale == "FLUXNET"));

    let screened_path = temp_dir.path().join("g1_fluxnet_screened.csv");
    writer.write_screened(&screened.rows, &screened_path).unwrap();
    assert_eq!(writer.read_screened(&screened_path).unwrap(), screened.rows);
}
