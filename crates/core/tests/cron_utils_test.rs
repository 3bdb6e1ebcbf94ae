#[cfg(test)]
mod cron_utils_tests {
    use scheduler_core::cron_utils::*;
    use scheduler_core::models::TriggerLocation;
    use scheduler_core::SchedulerError;

    use chrono::{Duration, TimeZone, Timelike, Utc};

    fn utc() -> TriggerLocation {
        TriggerLocation::parse("UTC").unwrap()
    }

    #[test]
    fn test_cron_scheduler_creation() {
        assert!(CronScheduler::new("0 0 0 * * *").is_ok());
        assert!(matches!(
            CronScheduler::new("invalid"),
            Err(SchedulerError::InvalidCron { .. })
        ));
        assert!(matches!(
            CronScheduler::new("  "),
            Err(SchedulerError::EmptyCronSpec)
        ));
    }

    #[test]
    fn test_next_execution_time_is_strictly_after() {
        let scheduler = CronScheduler::new("0 * * * * *").unwrap();

        let on_the_minute = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let next = scheduler
            .next_execution_time(on_the_minute, &utc())
            .unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 12, 1, 0).unwrap());
    }

    #[test]
    fn test_next_execution_time_honors_time_zone() {
        let scheduler = CronScheduler::new("0 0 9 * * *").unwrap();
        let shanghai = TriggerLocation::parse("Asia/Shanghai").unwrap();

        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap();
        let next = scheduler.next_execution_time(now, &shanghai).unwrap();
        // 上海 09:00 == UTC 01:00
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap());

        let next_utc = scheduler.next_execution_time(now, &utc()).unwrap();
        assert_eq!(next_utc.hour(), 9);
    }

    #[test]
    fn test_next_in_window_starts_from_from_time() {
        let scheduler = CronScheduler::new("0 0 * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap();
        let from = Utc.with_ymd_and_hms(2024, 1, 2, 0, 30, 0).unwrap();

        let next = scheduler.next_in_window(now, Some(from), None, &utc()).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 2, 1, 0, 0).unwrap());

        // from 已经过去时以 now 为起点
        let past_from = now - Duration::days(3);
        let next = scheduler
            .next_in_window(now, Some(past_from), None, &utc())
            .unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap());
    }

    #[test]
    fn test_next_in_window_respects_to_time() {
        let scheduler = CronScheduler::new("0 0 * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap();

        let to = Utc.with_ymd_and_hms(2024, 1, 1, 12, 45, 0).unwrap();
        assert!(scheduler.next_in_window(now, None, Some(to), &utc()).is_none());

        let to = Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap();
        assert_eq!(
            scheduler.next_in_window(now, None, Some(to), &utc()),
            Some(to)
        );
    }

    #[test]
    fn test_schedule_without_future_occurrence() {
        let scheduler = CronScheduler::new("0 0 0 1 1 * 2020").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(scheduler.next_in_window(now, None, None, &utc()).is_none());
    }

    #[test]
    fn test_validate_cron_expression() {
        assert!(CronScheduler::validate_cron_expression("0 0 0 * * *").is_ok());
        assert!(CronScheduler::validate_cron_expression("0 */5 * * * *").is_ok());
        assert!(CronScheduler::validate_cron_expression("0 0 9-17 * * 1-5").is_ok());
        assert!(CronScheduler::validate_cron_expression("invalid").is_err());
        assert!(CronScheduler::validate_cron_expression("0 0 0 32 * *").is_err());
        assert!(CronScheduler::validate_cron_expression("").is_err());
    }

    #[test]
    fn test_is_near() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert!(is_near(a, a, Duration::zero()));
        assert!(is_near(a, a + Duration::seconds(10), Duration::seconds(10)));
        assert!(is_near(a + Duration::seconds(10), a, Duration::seconds(10)));
        assert!(!is_near(a, a + Duration::seconds(11), Duration::seconds(10)));
    }
}
